use crate::websocket::RealtimeClient;

pub struct AppState {
    pub client: RealtimeClient,
    pub admin_token: String,
}

impl AppState {
    pub fn new(client: RealtimeClient, admin_token: String) -> Self {
        Self {
            client,
            admin_token,
        }
    }
}
