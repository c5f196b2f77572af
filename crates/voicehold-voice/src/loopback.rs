//! An in-process gateway that honours the [`VoiceGateway`] contract without a
//! network.
//!
//! Sessions, playback and voice-state events are all simulated in memory.
//! Fault injection hooks let callers fail connects, playback and disconnects,
//! drop sessions from the "platform side", or delete channels from the
//! directory.

use crate::error::VoiceError;
use crate::gateway::{ConnectOptions, VoiceConnection, VoiceGateway};
use crate::source::AudioSource;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};
use tokio::sync::{broadcast, watch};
use tokio::time::Instant;
use voicehold_types::{ChannelId, GuildId, UserId, VoiceChannel, VoiceStateUpdate};

const VOICE_STATE_BROADCAST_CAPACITY: usize = 64;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One call to [`VoiceGateway::connect`], as the loopback saw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectAttempt {
    pub channel: ChannelId,
    pub at: Instant,
    pub self_deaf: bool,
    pub succeeded: bool,
}

#[derive(Debug, Default)]
struct Faults {
    failing_connects: u32,
    failing_plays: u32,
    failing_disconnects: u32,
    dropping_connects: u32,
}

#[derive(Debug, Default)]
struct Guild {
    name: String,
    channels: BTreeMap<ChannelId, VoiceChannel>,
}

struct GatewayState {
    bot_user_id: UserId,
    directory: RwLock<BTreeMap<GuildId, Guild>>,
    connections: RwLock<HashMap<GuildId, Arc<LoopbackConnection>>>,
    ready_tx: watch::Sender<bool>,
    closed: AtomicBool,
    voice_tx: broadcast::Sender<VoiceStateUpdate>,
    faults: Mutex<Faults>,
    connect_log: Mutex<Vec<ConnectAttempt>>,
}

impl GatewayState {
    fn emit(&self, guild_id: GuildId, before: Option<ChannelId>, after: Option<ChannelId>) {
        // No subscribers is fine; nobody is listening yet.
        let _ = self.voice_tx.send(VoiceStateUpdate {
            user_id: self.bot_user_id,
            guild_id,
            before,
            after,
        });
    }

    fn forget(&self, connection: &LoopbackConnection) {
        let mut connections = self
            .connections
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let is_current = connections
            .get(&connection.guild_id)
            .is_some_and(|current| std::ptr::eq(Arc::as_ptr(current), connection));
        if is_current {
            connections.remove(&connection.guild_id);
        }
    }
}

/// Simulated gateway client.
#[derive(Clone)]
pub struct LoopbackGateway {
    state: Arc<GatewayState>,
}

impl LoopbackGateway {
    pub fn new(bot_user_id: UserId) -> Self {
        let (ready_tx, _) = watch::channel(false);
        let (voice_tx, _) = broadcast::channel(VOICE_STATE_BROADCAST_CAPACITY);
        Self {
            state: Arc::new(GatewayState {
                bot_user_id,
                directory: RwLock::new(BTreeMap::new()),
                connections: RwLock::new(HashMap::new()),
                ready_tx,
                closed: AtomicBool::new(false),
                voice_tx,
                faults: Mutex::new(Faults::default()),
                connect_log: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn add_guild(&self, guild_id: GuildId, name: impl Into<String>) {
        self.state
            .directory
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(guild_id)
            .or_default()
            .name = name.into();
    }

    /// Adds a voice channel, creating its guild entry if needed.
    pub fn add_channel(&self, channel: VoiceChannel) {
        self.state
            .directory
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(channel.guild_id)
            .or_default()
            .channels
            .insert(channel.id, channel);
    }

    /// Deletes a channel from the directory. Existing sessions are untouched.
    pub fn remove_channel(&self, guild_id: GuildId, channel_id: ChannelId) -> bool {
        self.state
            .directory
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(&guild_id)
            .is_some_and(|guild| guild.channels.remove(&channel_id).is_some())
    }

    pub fn guild_name(&self, guild_id: GuildId) -> Option<String> {
        self.state
            .directory
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&guild_id)
            .map(|guild| guild.name.clone())
    }

    /// Signals readiness to every `wait_until_ready` caller.
    pub fn mark_ready(&self) {
        self.state.ready_tx.send_replace(true);
    }

    /// Marks the client as shut down.
    pub fn close(&self) {
        self.state.closed.store(true, Ordering::SeqCst);
    }

    /// The next `count` connect calls fail.
    pub fn fail_next_connects(&self, count: u32) {
        lock(&self.state.faults).failing_connects = count;
    }

    /// The next `count` play calls fail.
    pub fn fail_next_plays(&self, count: u32) {
        lock(&self.state.faults).failing_plays = count;
    }

    /// The next `count` disconnect calls fail.
    pub fn fail_next_disconnects(&self, count: u32) {
        lock(&self.state.faults).failing_disconnects = count;
    }

    /// The next `count` successful connects are torn down by the platform
    /// right after `connect` returns.
    pub fn drop_next_connects(&self, count: u32) {
        lock(&self.state.faults).dropping_connects = count;
    }

    /// Simulates the platform dropping the guild's session.
    ///
    /// Returns `false` if the guild had no session.
    pub fn drop_connection(&self, guild_id: GuildId) -> bool {
        let connection = self
            .state
            .connections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&guild_id)
            .cloned();
        match connection {
            Some(connection) => {
                tracing::warn!(guild = %guild_id, "loopback dropping voice session");
                connection.teardown();
                true
            }
            None => false,
        }
    }

    /// Publishes an arbitrary voice-state event.
    pub fn emit_voice_state(&self, update: VoiceStateUpdate) {
        let _ = self.state.voice_tx.send(update);
    }

    /// Every connect call so far, in order.
    pub fn connect_attempts(&self) -> Vec<ConnectAttempt> {
        lock(&self.state.connect_log).clone()
    }

    /// The concrete session for `guild_id`, for inspection.
    pub fn loopback_connection(&self, guild_id: GuildId) -> Option<Arc<LoopbackConnection>> {
        self.state
            .connections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&guild_id)
            .cloned()
    }

    fn record(&self, channel: ChannelId, options: ConnectOptions, succeeded: bool) {
        lock(&self.state.connect_log).push(ConnectAttempt {
            channel,
            at: Instant::now(),
            self_deaf: options.self_deaf,
            succeeded,
        });
    }
}

impl fmt::Debug for LoopbackGateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoopbackGateway")
            .field("bot_user_id", &self.state.bot_user_id)
            .field("closed", &self.state.closed.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl VoiceGateway for LoopbackGateway {
    fn bot_user_id(&self) -> UserId {
        self.state.bot_user_id
    }

    async fn wait_until_ready(&self) {
        let mut ready = self.state.ready_tx.subscribe();
        // The sender lives as long as `self`, so this only returns once ready.
        let _ = ready.wait_for(|ready| *ready).await;
    }

    fn is_closed(&self) -> bool {
        self.state.closed.load(Ordering::SeqCst)
    }

    fn guilds(&self) -> Vec<GuildId> {
        self.state
            .directory
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect()
    }

    fn resolve_channel(&self, guild: GuildId, channel: ChannelId) -> Option<VoiceChannel> {
        self.state
            .directory
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&guild)
            .and_then(|entry| entry.channels.get(&channel))
            .cloned()
    }

    fn voice_connection(&self, guild: GuildId) -> Option<Arc<dyn VoiceConnection>> {
        self.loopback_connection(guild)
            .map(|connection| connection as Arc<dyn VoiceConnection>)
    }

    async fn connect(
        &self,
        channel: &VoiceChannel,
        options: ConnectOptions,
    ) -> Result<Arc<dyn VoiceConnection>, VoiceError> {
        // Stand-in for the network round trip.
        tokio::task::yield_now().await;

        if self.resolve_channel(channel.guild_id, channel.id).is_none() {
            self.record(channel.id, options, false);
            return Err(VoiceError::ChannelNotFound(channel.id));
        }

        {
            let mut faults = lock(&self.state.faults);
            if faults.failing_connects > 0 {
                faults.failing_connects -= 1;
                drop(faults);
                self.record(channel.id, options, false);
                return Err(VoiceError::Connect("injected connect failure".to_string()));
            }
        }

        let connection = {
            let mut connections = self
                .state
                .connections
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            if connections
                .get(&channel.guild_id)
                .is_some_and(|existing| existing.is_connected())
            {
                drop(connections);
                self.record(channel.id, options, false);
                return Err(VoiceError::Connect(
                    "already connected to a voice channel".to_string(),
                ));
            }
            let connection = Arc::new(LoopbackConnection {
                guild_id: channel.guild_id,
                channel: Mutex::new(Some(channel.id)),
                connected: AtomicBool::new(true),
                source: Mutex::new(None),
                self_deaf: options.self_deaf,
                gateway: Arc::downgrade(&self.state),
            });
            connections.insert(channel.guild_id, Arc::clone(&connection));
            connection
        };

        self.record(channel.id, options, true);
        self.state.emit(channel.guild_id, None, Some(channel.id));
        tracing::debug!(guild = %channel.guild_id, channel = %channel.id, "loopback session established");

        let dropped = {
            let mut faults = lock(&self.state.faults);
            let dropped = faults.dropping_connects > 0;
            if dropped {
                faults.dropping_connects -= 1;
            }
            dropped
        };
        if dropped {
            tracing::warn!(guild = %channel.guild_id, "loopback dropping fresh voice session");
            connection.teardown();
        }
        Ok(connection)
    }

    fn subscribe_voice_states(&self) -> broadcast::Receiver<VoiceStateUpdate> {
        self.state.voice_tx.subscribe()
    }
}

/// A simulated voice session.
pub struct LoopbackConnection {
    guild_id: GuildId,
    channel: Mutex<Option<ChannelId>>,
    connected: AtomicBool,
    source: Mutex<Option<Box<dyn AudioSource>>>,
    self_deaf: bool,
    gateway: Weak<GatewayState>,
}

impl LoopbackConnection {
    pub fn is_self_deaf(&self) -> bool {
        self.self_deaf
    }

    /// Pulls one frame from the playing source, as the transport would every
    /// 20ms. Returns the frame length, or `None` when nothing is playing.
    ///
    /// A zero-length frame ends playback.
    pub fn pull_frame(&self) -> Option<usize> {
        let mut source = lock(&self.source);
        let len = source.as_mut()?.read().len();
        if len == 0 {
            *source = None;
        }
        Some(len)
    }

    fn teardown(&self) {
        if !self.connected.swap(false, Ordering::SeqCst) {
            return;
        }
        let before = lock(&self.channel).take();
        lock(&self.source).take();
        if let Some(gateway) = self.gateway.upgrade() {
            gateway.forget(self);
            gateway.emit(self.guild_id, before, None);
        }
    }
}

impl fmt::Debug for LoopbackConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoopbackConnection")
            .field("guild_id", &self.guild_id)
            .field("channel", &*lock(&self.channel))
            .field("connected", &self.connected.load(Ordering::SeqCst))
            .field("playing", &lock(&self.source).is_some())
            .finish()
    }
}

#[async_trait]
impl VoiceConnection for LoopbackConnection {
    fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    fn channel_id(&self) -> Option<ChannelId> {
        *lock(&self.channel)
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn is_playing(&self) -> bool {
        self.is_connected() && lock(&self.source).is_some()
    }

    fn play(&self, source: Box<dyn AudioSource>) -> Result<(), VoiceError> {
        if !self.is_connected() {
            return Err(VoiceError::NotConnected);
        }
        if let Some(gateway) = self.gateway.upgrade() {
            let mut faults = lock(&gateway.faults);
            if faults.failing_plays > 0 {
                faults.failing_plays -= 1;
                return Err(VoiceError::Playback("injected playback failure".to_string()));
            }
        }
        let mut current = lock(&self.source);
        if current.is_some() {
            return Err(VoiceError::Playback("already playing audio".to_string()));
        }
        *current = Some(source);
        Ok(())
    }

    fn stop(&self) {
        lock(&self.source).take();
    }

    async fn move_to(&self, channel: &VoiceChannel) -> Result<(), VoiceError> {
        tokio::task::yield_now().await;
        if !self.is_connected() {
            return Err(VoiceError::NotConnected);
        }
        if channel.guild_id != self.guild_id {
            return Err(VoiceError::Move(format!(
                "channel {} belongs to another guild",
                channel.id
            )));
        }
        let before = lock(&self.channel).replace(channel.id);
        if let Some(gateway) = self.gateway.upgrade() {
            gateway.emit(self.guild_id, before, Some(channel.id));
        }
        Ok(())
    }

    async fn disconnect(&self, force: bool) -> Result<(), VoiceError> {
        tokio::task::yield_now().await;
        if let Some(gateway) = self.gateway.upgrade() {
            let mut faults = lock(&gateway.faults);
            if faults.failing_disconnects > 0 {
                faults.failing_disconnects -= 1;
                return Err(VoiceError::Disconnect(
                    "injected disconnect failure".to_string(),
                ));
            }
        }
        tracing::debug!(guild = %self.guild_id, force, "loopback session disconnecting");
        self.teardown();
        Ok(())
    }
}
