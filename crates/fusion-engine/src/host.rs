use fusion_core::packets::{InboundKind, OutboundPacket};
use fusion_core::GameId;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("host connection closed")]
    HostClosed,
}

/// Capability returned by [`PacketHost::hook`]; hand it back to `unhook`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HookToken {
    pub id: u64,
    pub kind: InboundKind,
}

/// What the engine needs from the mod-framework it runs inside.
pub trait PacketHost {
    fn send(&mut self, packet: OutboundPacket) -> Result<(), SendError>;

    /// Print a line to the player's chat/command window.
    fn message(&mut self, text: &str);

    /// The logged-in character, once the host knows it.
    fn player_id(&self) -> Option<GameId>;

    fn hook(&mut self, kind: InboundKind) -> HookToken;

    fn unhook(&mut self, token: HookToken);
}

/// The set of packet subscriptions held while a session or check is armed.
#[derive(Debug, Default)]
pub struct HookSet {
    tokens: Vec<HookToken>,
}

impl HookSet {
    pub fn acquire(&mut self, host: &mut impl PacketHost) {
        if !self.tokens.is_empty() {
            return;
        }
        self.tokens = InboundKind::ALL
            .iter()
            .map(|kind| host.hook(*kind))
            .collect();
    }

    pub fn release(&mut self, host: &mut impl PacketHost) {
        for token in self.tokens.drain(..) {
            host.unhook(token);
        }
    }

    pub fn covers(&self, kind: InboundKind) -> bool {
        self.tokens.iter().any(|token| token.kind == kind)
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}
