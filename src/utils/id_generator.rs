use std::sync::Arc;
use tinyrand::RandRange;
use tinyrand_std::thread_rand;

// No 0/O or 1/I so ids survive being read aloud from a status page.
const VALID_CHARS: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

pub const REGISTRATION_ID_LEN: usize = 10;
pub const SOCKET_ID_LEN: usize = 16;

pub fn mini_id(length: usize) -> Arc<str> {
    let mut rng = thread_rand();
    let id: String = (0..length)
        .map(|_| VALID_CHARS[rng.next_range(0..VALID_CHARS.len())] as char)
        .collect();

    Arc::from(id)
}
