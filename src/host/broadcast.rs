//! Component C: a same-origin broadcast channel mirroring `BroadcastChannel`
//! — at-least-once delivery of opaque byte payloads to every *other* agent
//! subscribed to the same channel name (a tab never receives its own
//! posts, matching the real `BroadcastChannel` API). Used to mirror a
//! committed transaction's full payload to sibling tabs/workers.

use core::future::Future;

use crate::host::HostError;

pub trait BroadcastSender: Send {
    fn send(&self, payload: Vec<u8>) -> impl Future<Output = Result<(), HostError>> + Send;
}

pub trait BroadcastReceiver: Send {
    fn recv(&mut self) -> impl Future<Output = Result<Vec<u8>, HostError>> + Send;

    /// Non-blocking drain of whatever is already queued, mirroring
    /// `mpsc::Receiver::try_recv`. Used to opportunistically pick up
    /// already-delivered commits without suspending.
    fn try_recv(&mut self) -> Option<Vec<u8>>;
}

pub trait Broadcast: Send + Sync {
    type Sender: BroadcastSender;
    type Receiver: BroadcastReceiver;

    /// Opens one channel handle for `channel`, returning a sender/receiver
    /// pair that share a single identity — mirroring a real `BroadcastChannel`
    /// object, which both posts and receives messages and never delivers a
    /// message back to the object that sent it. Two separate `open` calls for
    /// the same name are two independent agents, each of which sees the
    /// other's posts but not its own.
    fn open(&self, channel: &str) -> (Self::Sender, Self::Receiver);
}
