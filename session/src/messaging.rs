use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use uuid::Uuid;

use redline_core::messages::PartyMessage;

use crate::error::SessionError;
use crate::session::SessionContext;
use crate::store::ContractStore;

/// Message poll cadence while the panel is on screen.
pub const POLL_INTERVAL_OPEN: Duration = Duration::from_secs(10);
/// Message poll cadence while the panel is closed.
pub const POLL_INTERVAL_CLOSED: Duration = Duration::from_secs(30);

struct ChannelState {
    messages: Vec<PartyMessage>,
    seen: HashSet<Uuid>,
    unread: usize,
    panel_open: bool,
}

/// The party-to-party message channel: two producers (push subscription and
/// interval poll) writing into one sink deduplicated by message id. Neither
/// transport is trusted to be complete — push drops entries across
/// reconnects, poll lags by up to an interval — but their union converges,
/// and dedup makes running both concurrently safe.
pub struct MessageChannel {
    store: Arc<dyn ContractStore>,
    ctx: SessionContext,
    state: Mutex<ChannelState>,
}

impl MessageChannel {
    pub fn new(store: Arc<dyn ContractStore>, ctx: SessionContext) -> Self {
        Self {
            store,
            ctx,
            state: Mutex::new(ChannelState {
                messages: Vec::new(),
                seen: HashSet::new(),
                unread: 0,
                panel_open: false,
            }),
        }
    }

    pub fn poll_interval(panel_open: bool) -> Duration {
        if panel_open {
            POLL_INTERVAL_OPEN
        } else {
            POLL_INTERVAL_CLOSED
        }
    }

    /// Insert into the sink. Returns false when the id was already present.
    /// The unread counter moves only for another party's unread message
    /// while the panel is closed.
    fn absorb(&self, state: &mut ChannelState, message: PartyMessage) -> bool {
        if !state.seen.insert(message.id) {
            return false;
        }
        if message.sender_id != self.ctx.party_id && !message.is_read && !state.panel_open {
            state.unread += 1;
        }
        state.messages.push(message);
        state.messages.sort_by_key(|m| (m.created_at, m.id));
        true
    }

    /// Send a message to the other party.
    pub async fn send(
        &self,
        text: &str,
        clause_id: Option<Uuid>,
    ) -> Result<PartyMessage, SessionError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SessionError::validation(
                "message must not be empty",
                Some("text"),
            ));
        }

        let mut message = PartyMessage::new(
            self.ctx.contract_id,
            self.ctx.party_id,
            self.ctx.party_name.clone(),
            self.ctx.party_role,
            text,
        );
        if let Some(clause_id) = clause_id {
            message = message.about_clause(clause_id);
        }

        self.store.insert_message(message.clone()).await?;
        // The push path may echo our own insert; dedup handles it.
        let mut state = self.state.lock().await;
        self.absorb(&mut state, message.clone());
        Ok(message)
    }

    /// Push-path delivery from the live subscription.
    pub async fn receive_push(&self, message: PartyMessage) {
        if message.contract_id != self.ctx.contract_id {
            return;
        }
        let mut state = self.state.lock().await;
        self.absorb(&mut state, message);
    }

    /// Poll-path catch-up: fetch the full ordered list and merge. Safe to
    /// run concurrently with the push path.
    pub async fn poll_once(&self) -> Result<(), SessionError> {
        let fetched = self.store.list_messages(self.ctx.contract_id).await?;
        let mut state = self.state.lock().await;
        for message in fetched {
            self.absorb(&mut state, message);
        }
        Ok(())
    }

    /// Open the panel: one bulk store update marks everything unread from
    /// the other party as read (never a per-message loop — a push landing
    /// mid-loop would be lost), then the local copies and counter follow.
    /// Returns the number of rows the store changed.
    pub async fn open_panel(&self) -> Result<u64, SessionError> {
        let changed = self
            .store
            .mark_messages_read(self.ctx.contract_id, self.ctx.party_id)
            .await?;

        let mut state = self.state.lock().await;
        state.panel_open = true;
        for message in state
            .messages
            .iter_mut()
            .filter(|m| m.sender_id != self.ctx.party_id)
        {
            message.is_read = true;
        }
        state.unread = 0;
        Ok(changed)
    }

    pub async fn close_panel(&self) {
        self.state.lock().await.panel_open = false;
    }

    pub async fn is_panel_open(&self) -> bool {
        self.state.lock().await.panel_open
    }

    pub async fn messages(&self) -> Vec<PartyMessage> {
        self.state.lock().await.messages.clone()
    }

    pub async fn unread_count(&self) -> usize {
        self.state.lock().await.unread
    }
}

#[cfg(test)]
mod tests {
    use redline_core::clause::PartyRole;

    use super::*;
    use crate::memory::MemoryStore;

    fn ctx(contract_id: Uuid) -> SessionContext {
        SessionContext {
            contract_id,
            party_id: Uuid::now_v7(),
            party_name: "Alex".to_string(),
            party_role: PartyRole::Initiator,
            user_agent: None,
        }
    }

    fn from_other(contract_id: Uuid, text: &str) -> PartyMessage {
        PartyMessage::new(
            contract_id,
            Uuid::now_v7(),
            "Robin",
            PartyRole::Respondent,
            text,
        )
    }

    fn channel() -> (Arc<MemoryStore>, MessageChannel, Uuid) {
        let store = Arc::new(MemoryStore::new());
        let contract_id = Uuid::now_v7();
        store.seed_contract(contract_id, vec![]);
        let channel = MessageChannel::new(store.clone(), ctx(contract_id));
        (store, channel, contract_id)
    }

    #[tokio::test]
    async fn same_message_via_push_and_poll_lands_once() {
        let (store, channel, contract_id) = channel();
        let message = from_other(contract_id, "hello");

        store.insert_message(message.clone()).await.unwrap();
        channel.receive_push(message).await;
        channel.poll_once().await.unwrap();

        assert_eq!(channel.messages().await.len(), 1);
        assert_eq!(channel.unread_count().await, 1);
    }

    #[tokio::test]
    async fn poll_catches_up_on_missed_push() {
        let (store, channel, contract_id) = channel();
        for text in ["one", "two"] {
            store
                .insert_message(from_other(contract_id, text))
                .await
                .unwrap();
        }

        // No push delivery at all; poll alone must converge.
        channel.poll_once().await.unwrap();
        assert_eq!(channel.messages().await.len(), 2);
        assert_eq!(channel.unread_count().await, 2);
    }

    #[tokio::test]
    async fn unread_counts_while_closed_and_resets_in_one_batch_on_open() {
        let (store, channel, contract_id) = channel();
        for text in ["one", "two", "three"] {
            let message = from_other(contract_id, text);
            store.insert_message(message.clone()).await.unwrap();
            channel.receive_push(message).await;
        }
        assert_eq!(channel.unread_count().await, 3);

        let changed = channel.open_panel().await.unwrap();
        assert_eq!(changed, 3);
        assert_eq!(channel.unread_count().await, 0);
        assert!(channel.messages().await.iter().all(|m| m.is_read));
        assert!(
            store
                .list_messages(contract_id)
                .await
                .unwrap()
                .iter()
                .all(|m| m.is_read)
        );
    }

    #[tokio::test]
    async fn own_messages_never_count_as_unread() {
        let (_store, channel, _contract_id) = channel();
        let sent = channel.send("ours", None).await.unwrap();

        // Echo back through the push path, as a live subscription would.
        channel.receive_push(sent).await;
        assert_eq!(channel.messages().await.len(), 1);
        assert_eq!(channel.unread_count().await, 0);
    }

    #[tokio::test]
    async fn arrivals_while_open_do_not_bump_the_counter() {
        let (_store, channel, contract_id) = channel();
        channel.open_panel().await.unwrap();
        channel.receive_push(from_other(contract_id, "hi")).await;
        assert_eq!(channel.unread_count().await, 0);
    }

    #[tokio::test]
    async fn empty_message_is_rejected_locally() {
        let (store, channel, contract_id) = channel();
        let err = channel.send("  ", None).await.unwrap_err();
        assert!(matches!(err, SessionError::Validation { .. }));
        assert!(store.list_messages(contract_id).await.unwrap().is_empty());
    }

    #[test]
    fn poll_cadence_follows_panel_state() {
        assert_eq!(MessageChannel::poll_interval(true), POLL_INTERVAL_OPEN);
        assert_eq!(MessageChannel::poll_interval(false), POLL_INTERVAL_CLOSED);
    }
}
