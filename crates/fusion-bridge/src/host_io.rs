use chrono::Utc;
use fusion_core::frame::{
    HookPayload, HostEnvelope, HostMsg, MessagePayload, SendPayload, UnhookPayload,
};
use fusion_core::packets::{InboundKind, OutboundPacket};
use fusion_core::GameId;
use fusion_engine::{HookToken, PacketHost, SendError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// [`PacketHost`] that turns engine calls into outbound frames for the host
/// mod-framework. The player id is filled in by the reader when `hello`
/// arrives; zero means not yet known.
pub struct FrameHost {
    out: mpsc::UnboundedSender<HostEnvelope>,
    player: Arc<AtomicU64>,
    next_token: u64,
}

impl FrameHost {
    pub fn new(out: mpsc::UnboundedSender<HostEnvelope>, player: Arc<AtomicU64>) -> Self {
        Self {
            out,
            player,
            next_token: 0,
        }
    }

    fn emit(&self, msg: HostMsg) -> Result<(), SendError> {
        let envelope = HostEnvelope::new(msg, Some(Utc::now().to_rfc3339()));
        self.out
            .send(envelope)
            .map_err(|_| SendError::HostClosed)
    }
}

impl PacketHost for FrameHost {
    fn send(&mut self, packet: OutboundPacket) -> Result<(), SendError> {
        self.emit(HostMsg::Send(SendPayload {
            version: packet.version(),
            packet,
        }))
    }

    fn message(&mut self, text: &str) {
        let msg = HostMsg::Message(MessagePayload {
            text: text.to_string(),
        });
        if self.emit(msg).is_err() {
            debug!(event = "message_dropped", text);
        }
    }

    fn player_id(&self) -> Option<GameId> {
        match self.player.load(Ordering::Relaxed) {
            0 => None,
            id => Some(id),
        }
    }

    fn hook(&mut self, kind: InboundKind) -> HookToken {
        self.next_token += 1;
        let token = HookToken {
            id: self.next_token,
            kind,
        };
        let msg = HostMsg::Hook(HookPayload {
            token: token.id,
            name: kind.packet_name().to_string(),
            version: kind.version(),
        });
        if let Err(err) = self.emit(msg) {
            warn!(event = "hook_failed", packet = kind.packet_name(), error = %err);
        }
        token
    }

    fn unhook(&mut self, token: HookToken) {
        if let Err(err) = self.emit(HostMsg::Unhook(UnhookPayload { token: token.id })) {
            debug!(event = "unhook_dropped", token = token.id, error = %err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fusion_core::frame::ProtocolVersion;

    fn host() -> (FrameHost, mpsc::UnboundedReceiver<HostEnvelope>, Arc<AtomicU64>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let player = Arc::new(AtomicU64::new(0));
        (FrameHost::new(tx, player.clone()), rx, player)
    }

    #[test]
    fn send_wraps_packet_with_version() {
        let (mut host, mut rx, _) = host();
        host.send(OutboundPacket::RequestContract { contract_type: 89 })
            .expect("send");
        let envelope = rx.try_recv().expect("frame queued");
        assert_eq!(envelope.version, ProtocolVersion::CURRENT);
        let stamp = envelope.timestamp.as_deref().expect("timestamp");
        chrono::DateTime::parse_from_rfc3339(stamp).expect("rfc3339 timestamp");
        match envelope.msg {
            HostMsg::Send(payload) => {
                assert_eq!(payload.version, 1);
                assert_eq!(
                    payload.packet,
                    OutboundPacket::RequestContract { contract_type: 89 }
                );
            }
            other => panic!("expected send frame, got {other:?}"),
        }
    }

    #[test]
    fn hooks_carry_packet_name_and_definition_version() {
        let (mut host, mut rx, _) = host();
        let first = host.hook(InboundKind::ItemList);
        let second = host.hook(InboundKind::EvolutionResult);
        assert_ne!(first.id, second.id);
        let HostMsg::Hook(hook) = rx.try_recv().expect("hook frame").msg else {
            panic!("expected hook frame")
        };
        assert_eq!(hook.name, "S_ITEMLIST");
        assert_eq!(hook.version, 4);
        host.unhook(first);
        let _ = rx.try_recv().expect("second hook frame");
        let HostMsg::Unhook(unhook) = rx.try_recv().expect("unhook frame").msg else {
            panic!("expected unhook frame")
        };
        assert_eq!(unhook.token, first.id);
    }

    #[test]
    fn player_id_is_unknown_until_hello() {
        let (host, _rx, player) = host();
        assert_eq!(host.player_id(), None);
        player.store(77, Ordering::Relaxed);
        assert_eq!(host.player_id(), Some(77));
    }

    #[test]
    fn closed_channel_reports_host_closed() {
        let (mut host, rx, _) = host();
        drop(rx);
        assert_eq!(
            host.send(OutboundPacket::CancelContract { contract_type: 89 }),
            Err(SendError::HostClosed)
        );
        host.message("still fine");
    }
}
