// Copyright 2018 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! C8: normalizes native driver callbacks into `fsm::Message`s (spec §4.8).
//! Runs off the mailbox; never blocks, never panics on a malformed payload
//! — a bad callback is logged and dropped rather than propagated.

use tokio::sync::mpsc;

use crate::config::{Bandwidth, Client, Mac};
use crate::fsm::Message;

/// The untyped shape native callbacks arrive in, before being validated and
/// translated into a `Message`. A real adapter would decode these off a
/// FIDL/netlink payload; here the demux only needs the logical fields.
#[derive(Clone, Debug)]
pub enum RawDriverEvent {
    AssociatedStationsChanged { mac: [u8; 6], connected: bool },
    ConnectedStations { mac: [u8; 6] },
    DisconnectedStations { mac: [u8; 6] },
    ChannelSwitched { frequency: u32, channel_bandwidth: u8 },
    InterfaceStatusChanged { up: bool },
    InterfaceDestroyed,
    DualSapInterfaceDestroyed { iface: String },
    Failure,
    InterfaceDown,
}

/// Forwards normalized events onto an FSM mailbox. Holds only a sender, so
/// it can be cloned cheaply and handed to however many native callback
/// registrations the driver adapter needs.
#[derive(Clone)]
pub struct DriverEventDemux {
    mailbox_tx: mpsc::Sender<Message>,
}

impl DriverEventDemux {
    pub fn new(mailbox_tx: mpsc::Sender<Message>) -> Self {
        DriverEventDemux { mailbox_tx }
    }

    /// Translates and forwards one event. Never blocks indefinitely: a
    /// full mailbox is logged and the event dropped rather than awaited,
    /// since a driver callback thread must not be allowed to stall behind
    /// an unbounded wait on manager-internal backpressure.
    pub fn dispatch(&self, event: RawDriverEvent) {
        let message = match translate(event) {
            Some(m) => m,
            None => return,
        };
        match self.mailbox_tx.try_send(message) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                log::error!("fsm mailbox full; dropping driver event");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                log::debug!("fsm mailbox closed; dropping driver event");
            }
        }
    }
}

fn translate(event: RawDriverEvent) -> Option<Message> {
    match event {
        RawDriverEvent::AssociatedStationsChanged { mac, connected } => {
            Some(Message::AssociatedStationsChanged { client: Client::new(Mac(mac)), connected })
        }
        RawDriverEvent::ConnectedStations { mac } => Some(Message::ConnectedStations { mac: Mac(mac) }),
        RawDriverEvent::DisconnectedStations { mac } => {
            Some(Message::DisconnectedStations { mac: Mac(mac) })
        }
        RawDriverEvent::ChannelSwitched { frequency, channel_bandwidth } => {
            let bandwidth = match channel_bandwidth {
                20 => Bandwidth::Bw20,
                40 => Bandwidth::Bw40,
                80 => Bandwidth::Bw80,
                160 => Bandwidth::Bw160,
                other => {
                    log::error!("unrecognized channel bandwidth code {}; dropping event", other);
                    return None;
                }
            };
            Some(Message::SoftApChannelSwitched { frequency, bandwidth })
        }
        RawDriverEvent::InterfaceStatusChanged { up } => Some(Message::InterfaceStatusChanged { up }),
        RawDriverEvent::InterfaceDestroyed => Some(Message::InterfaceDestroyed),
        RawDriverEvent::DualSapInterfaceDestroyed { iface } => {
            Some(Message::DualSapInterfaceDestroyed { iface })
        }
        RawDriverEvent::Failure => Some(Message::Failure),
        RawDriverEvent::InterfaceDown => Some(Message::InterfaceDown),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel() -> (DriverEventDemux, mpsc::Receiver<Message>) {
        let (tx, rx) = mpsc::channel(4);
        (DriverEventDemux::new(tx), rx)
    }

    #[test]
    fn translates_associated_stations_changed() {
        let (demux, mut rx) = channel();
        demux.dispatch(RawDriverEvent::AssociatedStationsChanged { mac: [1, 2, 3, 4, 5, 6], connected: true });
        match rx.try_recv().unwrap() {
            Message::AssociatedStationsChanged { client, connected } => {
                assert_eq!(client.mac, Mac([1, 2, 3, 4, 5, 6]));
                assert!(connected);
            }
            _ => panic!("expected AssociatedStationsChanged"),
        }
    }

    #[test]
    fn unrecognized_bandwidth_is_dropped_not_forwarded() {
        let (demux, mut rx) = channel();
        demux.dispatch(RawDriverEvent::ChannelSwitched { frequency: 2412, channel_bandwidth: 7 });
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn full_mailbox_drops_event_without_panicking() {
        let (tx, mut rx) = mpsc::channel(1);
        let demux = DriverEventDemux::new(tx);
        demux.dispatch(RawDriverEvent::Failure);
        demux.dispatch(RawDriverEvent::InterfaceDown);
        assert!(matches!(rx.try_recv().unwrap(), Message::Failure));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn closed_mailbox_is_silently_dropped() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let demux = DriverEventDemux::new(tx);
        demux.dispatch(RawDriverEvent::InterfaceDestroyed);
    }
}
