//! Pure folding of subscription intents into the single outbound payload.

use std::collections::BTreeSet;

use crate::models::intent::{
    MarketsIntent, MemosIntent, MergedSubscription, NotificationsIntent, SubscriptionIntent,
    TransactionsIntent,
};

/// Folds intents into one payload.
///
/// Callers must pass intents in a stable order (the registry uses registration-id order);
/// only `notifications.wallet` depends on it. The lowest `transactions.minAmount` wins, so a
/// single low-threshold subscriber lowers the filter for the whole connection.
pub fn merge_intents<'a, I>(intents: I) -> MergedSubscription
where
    I: IntoIterator<Item = &'a SubscriptionIntent>,
{
    let mut markets: Option<(bool, BTreeSet<String>)> = None;
    let mut transactions: Option<(Option<f64>, BTreeSet<String>)> = None;
    let mut memos: Option<bool> = None;
    let mut chat = false;
    let mut notifications: Option<(Option<String>, BTreeSet<String>)> = None;

    for intent in intents {
        if let Some(intent) = &intent.markets {
            let (all, ids) = markets.get_or_insert_with(Default::default);
            *all |= intent.all;
            ids.extend(intent.markets.iter().cloned());
        }

        if let Some(intent) = &intent.transactions {
            let (min_amount, addresses) = transactions.get_or_insert_with(Default::default);
            if let Some(amount) = intent.min_amount {
                *min_amount = Some(min_amount.map_or(amount, |current| current.min(amount)));
            }
            addresses.extend(intent.addresses.iter().cloned());
        }

        if let Some(intent) = &intent.memos {
            let all = memos.get_or_insert(false);
            *all |= intent.all;
        }

        chat |= intent.chat.unwrap_or(false);

        if let Some(intent) = &intent.notifications {
            let (wallet, channels) = notifications.get_or_insert_with(Default::default);
            if wallet.is_none() {
                *wallet = intent.wallet.clone().filter(|w| !w.is_empty());
            }
            channels.extend(intent.channels.iter().cloned());
        }
    }

    MergedSubscription {
        markets: markets.map(|(all, ids)| MarketsIntent {
            all,
            markets: ids.into_iter().collect(),
        }),
        transactions: transactions.map(|(min_amount, addresses)| TransactionsIntent {
            min_amount,
            addresses: addresses.into_iter().collect(),
        }),
        memos: memos.map(|all| MemosIntent { all }),
        chat,
        notifications: notifications.map(|(wallet, channels)| NotificationsIntent {
            wallet,
            channels: channels.into_iter().collect(),
        }),
    }
}

/// Comment threads referenced by any intent, deduplicated and sorted.
pub fn comment_threads<'a, I>(intents: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a SubscriptionIntent>,
{
    intents
        .into_iter()
        .filter_map(|intent| intent.comments.as_ref())
        .map(|comments| comments.resource_id.clone())
        .filter(|id| !id.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
