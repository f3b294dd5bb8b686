//! Signal/slot notifications.
//!
//! A [`Signal<Args>`] holds a set of connected slots (closures) and invokes
//! them when emitted. Workers and the worker manager use signals to publish
//! status changes; editor components use them for settings changes and user
//! messages.
//!
//! # Connection Types
//!
//! - **Direct**: Slot is called immediately in the emitting thread
//! - **Queued**: Slot is posted to a [`Dispatcher`](crate::Dispatcher) and
//!   runs on its interactive thread
//! - **Auto**: Direct if emitted on the dispatcher's thread, Queued otherwise
//! - **BlockingQueued**: Like Queued, but the emitter waits for the slot
//!
//! Queued types need a target dispatcher, given with
//! [`Signal::connect_via`]. Connections made with [`Signal::connect`] are
//! always direct.
//!
//! # Example
//!
//! ```
//! use dto_editor_core::Signal;
//!
//! let text_changed = Signal::<String>::new();
//!
//! let conn_id = text_changed.connect(|text| {
//!     println!("Text changed to: {}", text);
//! });
//!
//! text_changed.emit("Hello, World!".to_string());
//! text_changed.disconnect(conn_id);
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use slotmap::{SlotMap, new_key_type};

use crate::dispatcher::DispatcherProxy;

new_key_type! {
    /// A unique identifier for a signal-slot connection.
    ///
    /// Use this ID to disconnect a specific connection via [`Signal::disconnect`].
    pub struct ConnectionId;
}

/// Specifies how a connected slot should be invoked when the signal is emitted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConnectionType {
    /// Invoke the slot immediately in the emitting thread.
    Direct,

    /// Post the slot invocation to the target dispatcher.
    Queued,

    /// Direct when emitted on the dispatcher's thread, Queued otherwise.
    #[default]
    Auto,

    /// Like Queued, but blocks the emitting thread until the slot completes.
    ///
    /// Emitting on the dispatcher's own thread runs the slot inline instead of
    /// deadlocking.
    BlockingQueued,
}

type Slot<Args> = Arc<dyn Fn(&Args) + Send + Sync>;

/// Internal storage for a single connection.
struct Connection<Args> {
    slot: Slot<Args>,
    connection_type: ConnectionType,
    /// Dispatcher that receives queued invocations.
    target: Option<DispatcherProxy>,
}

/// A type-safe signal that can have multiple connected slots.
///
/// Signals are `Send + Sync`; share them across threads behind an `Arc`.
pub struct Signal<Args> {
    connections: Mutex<SlotMap<ConnectionId, Connection<Args>>>,
    blocked: AtomicBool,
}

impl<Args: Clone + Send + 'static> Default for Signal<Args> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Args: Clone + Send + 'static> Signal<Args> {
    /// Create a new signal with no connections.
    pub fn new() -> Self {
        Self {
            connections: Mutex::new(SlotMap::with_key()),
            blocked: AtomicBool::new(false),
        }
    }

    /// Connect a slot that is invoked directly in the emitting thread.
    pub fn connect<F>(&self, slot: F) -> ConnectionId
    where
        F: Fn(&Args) + Send + Sync + 'static,
    {
        self.insert(Connection {
            slot: Arc::new(slot),
            connection_type: ConnectionType::Direct,
            target: None,
        })
    }

    /// Connect a slot whose invocation is routed through `dispatcher`.
    ///
    /// # Example
    ///
    /// ```
    /// use dto_editor_core::{ConnectionType, Dispatcher, Signal};
    ///
    /// let dispatcher = Dispatcher::new();
    /// let signal = Signal::<i32>::new();
    ///
    /// // Always runs on the dispatcher's thread, after the emitter returns
    /// signal.connect_via(|n| println!("{}", n), &dispatcher.proxy(), ConnectionType::Queued);
    ///
    /// signal.emit(42);
    /// dispatcher.process_pending();
    /// ```
    pub fn connect_via<F>(
        &self,
        slot: F,
        dispatcher: &DispatcherProxy,
        connection_type: ConnectionType,
    ) -> ConnectionId
    where
        F: Fn(&Args) + Send + Sync + 'static,
    {
        self.insert(Connection {
            slot: Arc::new(slot),
            connection_type,
            target: Some(dispatcher.clone()),
        })
    }

    fn insert(&self, connection: Connection<Args>) -> ConnectionId {
        self.connections.lock().insert(connection)
    }

    /// Disconnect a specific slot by its connection ID.
    ///
    /// Returns `true` if the connection was found and removed.
    pub fn disconnect(&self, id: ConnectionId) -> bool {
        self.connections.lock().remove(id).is_some()
    }

    /// Disconnect all slots from this signal.
    pub fn disconnect_all(&self) {
        self.connections.lock().clear();
    }

    /// Get the number of connected slots.
    pub fn connection_count(&self) -> usize {
        self.connections.lock().len()
    }

    /// Block signal emission temporarily.
    pub fn set_blocked(&self, blocked: bool) {
        self.blocked.store(blocked, Ordering::SeqCst);
    }

    /// Check if signal emission is currently blocked.
    pub fn is_blocked(&self) -> bool {
        self.blocked.load(Ordering::SeqCst)
    }

    /// Emit the signal, invoking all connected slots.
    ///
    /// The connection list is snapshotted before any slot runs, so slots may
    /// connect or disconnect on this signal without deadlocking.
    #[tracing::instrument(skip_all, target = "dto_editor_core::signal", level = "trace")]
    pub fn emit(&self, args: Args) {
        if self.is_blocked() {
            tracing::trace!(target: "dto_editor_core::signal", "signal blocked, skipping emit");
            return;
        }

        let snapshot: Vec<(Slot<Args>, ConnectionType, Option<DispatcherProxy>)> = self
            .connections
            .lock()
            .values()
            .map(|conn| (conn.slot.clone(), conn.connection_type, conn.target.clone()))
            .collect();
        tracing::trace!(target: "dto_editor_core::signal", connection_count = snapshot.len(), "emitting signal");

        for (slot, connection_type, target) in snapshot {
            match (connection_type, target) {
                (ConnectionType::Direct, _) => slot(&args),
                (_, None) => {
                    tracing::warn!(
                        target: "dto_editor_core::signal",
                        ?connection_type,
                        "queued connection without a dispatcher, invoking directly"
                    );
                    slot(&args);
                }
                (ConnectionType::Auto, Some(target)) => {
                    if target.is_interactive_thread() {
                        slot(&args);
                    } else {
                        Self::queue(slot, args.clone(), &target);
                    }
                }
                (ConnectionType::Queued, Some(target)) => {
                    Self::queue(slot, args.clone(), &target);
                }
                (ConnectionType::BlockingQueued, Some(target)) => {
                    let args = args.clone();
                    if target.post_blocking(move || slot(&args)).is_err() {
                        tracing::warn!(
                            target: "dto_editor_core::signal",
                            "dispatcher gone, dropping blocking queued invocation"
                        );
                    }
                }
            }
        }
    }

    fn queue(slot: Slot<Args>, args: Args, target: &DispatcherProxy) {
        if target.post(move || slot(&args)).is_err() {
            tracing::warn!(
                target: "dto_editor_core::signal",
                "dispatcher gone, dropping queued invocation"
            );
        }
    }
}

static_assertions::assert_impl_all!(Signal<String>: Send, Sync);
