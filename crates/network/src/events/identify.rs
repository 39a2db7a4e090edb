use libp2p::identify::Event;
use owo_colors::OwoColorize;
use tracing::debug;

use super::{EventHandler, EventLoop};
use crate::stream::POST_PROTOCOL;

impl EventHandler<Event> for EventLoop {
    async fn handle(&mut self, event: Event) {
        debug!("{}: {:?}", "identify".yellow(), event);

        if let Event::Received { peer_id, info, .. } = event {
            if !info.protocols.contains(&POST_PROTOCOL) {
                debug!(
                    %peer_id,
                    agent = %info.agent_version,
                    "Peer does not accept the post protocol"
                );
            }
        }
    }
}
