use std::collections::{HashMap, VecDeque};

use crate::election::response_delay_ms;
use crate::message::{Delta, Message, SnapshotImage};
use crate::traits::{PaintSurface, SnapshotCache};
use crate::types::{random_id, ClientId, ReqId};

/// How long a fresh session waits for a snapshot before falling back to the
/// cached (or empty) canvas.
pub const SYNC_FALLBACK_MS: u64 = 400;
/// How long a still-syncing responder may defer its countdown before
/// proceeding with whatever state it has.
pub const DEFER_CEILING_MS: u64 = 400;
/// Debounce for the background cache save while live.
pub const CACHE_SAVE_DEBOUNCE_MS: u64 = 1000;

/// Keys for the host-managed timers. The session ignores fires for timers
/// it no longer considers armed, so a host may deliver stale fires freely.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TimerKey {
    SyncFallback,
    CandidateResponse(ReqId),
    DeferredResponse(ReqId),
    CacheSave,
}

/// Instructions for the host driving this session: frames to relay and
/// timers to schedule or cancel. Drained via `consume_outputs`.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionOutput {
    Send(String),
    Schedule { key: TimerKey, delay_ms: u64 },
    Cancel(TimerKey),
}

enum SyncState {
    /// Between joining a room and obtaining a base snapshot (or fallback).
    /// Incoming deltas are queued, not applied.
    Syncing { req_id: ReqId, queued: Vec<String> },
    Live,
}

enum PendingResponse {
    /// Waiting to leave `Syncing` before starting the countdown.
    Deferred,
    /// Countdown running; firing sends the snapshot.
    Scheduled,
}

/// Client side of the sync protocol. Pure state machine: the host feeds
/// decoded-or-raw events in and drains `SessionOutput`s out; no I/O and no
/// real timers live here.
pub struct ClientSession<S: PaintSurface, C: SnapshotCache> {
    client_id: ClientId,
    surface: S,
    cache: C,
    state: SyncState,
    pending_responses: HashMap<ReqId, PendingResponse>,
    cache_save_armed: bool,
    outputs: VecDeque<SessionOutput>,
}

impl<S: PaintSurface, C: SnapshotCache> ClientSession<S, C> {
    pub fn new(surface: S, cache: C) -> Self {
        Self::with_client_id(random_id(), surface, cache)
    }

    pub fn with_client_id(client_id: ClientId, surface: S, cache: C) -> Self {
        Self {
            client_id,
            surface,
            cache,
            state: SyncState::Live,
            pending_responses: HashMap::new(),
            cache_save_armed: false,
            outputs: VecDeque::new(),
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn is_syncing(&self) -> bool {
        matches!(self.state, SyncState::Syncing { .. })
    }

    pub fn has_pending_response(&self, req_id: &str) -> bool {
        self.pending_responses.contains_key(req_id)
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn consume_outputs(&mut self) -> Vec<SessionOutput> {
        self.outputs.drain(..).collect()
    }

    /// Starts a sync attempt from scratch. Called on every (re)connect:
    /// a previous attempt's timers are cancelled, a fresh request id is
    /// drawn, and live updates start queuing until the canvas is seeded.
    pub fn connected(&mut self) {
        self.cancel_all_timers();

        let req_id = random_id();
        let (width, height) = self.surface.size();
        log::debug!("starting sync attempt {} as {}", req_id, self.client_id);

        self.push(SessionOutput::Send(
            Message::Presence {
                client_id: self.client_id.clone(),
            }
            .encode(),
        ));
        self.push(SessionOutput::Send(
            Message::SnapshotRequest {
                req_id: req_id.clone(),
                requester_id: self.client_id.clone(),
                width,
                height,
            }
            .encode(),
        ));
        self.push(SessionOutput::Schedule {
            key: TimerKey::SyncFallback,
            delay_ms: SYNC_FALLBACK_MS,
        });

        self.state = SyncState::Syncing {
            req_id,
            queued: Vec::new(),
        };
    }

    /// Single entry point for everything the relay delivers. Malformed
    /// frames are dropped without touching any state.
    pub fn handle_frame(&mut self, raw: &str) {
        let message = match Message::decode(raw) {
            Some(message) => message,
            None => {
                log::debug!("dropping malformed frame: {:?}", raw);
                return;
            }
        };
        match message {
            Message::Paint(delta) => self.handle_delta(delta),
            Message::SnapshotRequest {
                req_id,
                requester_id,
                ..
            } => self.handle_request(req_id, requester_id),
            Message::SnapshotResponse { req_id, image, .. } => {
                self.handle_response(req_id, image)
            }
            Message::Presence { .. } => {}
        }
    }

    /// A local paint action: applied to the surface immediately, then
    /// broadcast.
    pub fn paint_local(&mut self, x: i32, y: i32, radius: f32, color: &str) {
        let delta = Delta {
            x,
            y,
            radius,
            color: color.trim_start_matches('#').to_string(),
        };
        self.surface.draw(&delta);
        self.push(SessionOutput::Send(Message::Paint(delta).encode()));
        if let SyncState::Live = self.state {
            self.arm_cache_save();
        }
    }

    pub fn timer_fired(&mut self, key: TimerKey) {
        match key {
            TimerKey::SyncFallback => self.fallback_fired(),
            TimerKey::CandidateResponse(req_id) => self.candidate_fired(req_id),
            TimerKey::DeferredResponse(req_id) => self.deferred_deadline_fired(req_id),
            TimerKey::CacheSave => self.cache_save_fired(),
        }
    }

    fn handle_delta(&mut self, delta: Delta) {
        if let SyncState::Syncing { queued, .. } = &mut self.state {
            // Queued in arrival order, replayed through handle_frame once
            // the canvas has a base image.
            queued.push(Message::Paint(delta).encode());
            return;
        }
        self.apply_delta(&delta);
    }

    fn apply_delta(&mut self, delta: &Delta) {
        let (width, height) = self.surface.size();
        if delta.x < 0 || delta.y < 0 || delta.x as u32 >= width || delta.y as u32 >= height {
            return;
        }
        self.surface.draw(delta);
        self.arm_cache_save();
    }

    fn handle_request(&mut self, req_id: ReqId, requester_id: ClientId) {
        if requester_id == self.client_id {
            return;
        }
        // At most one pending timer per req id.
        if self.pending_responses.contains_key(&req_id) {
            return;
        }
        match self.state {
            SyncState::Live => self.schedule_candidate(req_id),
            SyncState::Syncing { .. } => {
                // Answering with a not-yet-synced canvas would propagate
                // stale state. Wait until we are live, bounded by a ceiling.
                self.pending_responses
                    .insert(req_id.clone(), PendingResponse::Deferred);
                self.push(SessionOutput::Schedule {
                    key: TimerKey::DeferredResponse(req_id),
                    delay_ms: DEFER_CEILING_MS,
                });
            }
        }
    }

    fn handle_response(&mut self, req_id: ReqId, image: SnapshotImage) {
        // Any observed answer for this req id cancels our own candidacy,
        // whoever sent it.
        self.cancel_pending_response(&req_id);

        let ours = matches!(&self.state, SyncState::Syncing { req_id: requested, .. } if *requested == req_id);
        if !ours {
            // Stale or duplicate answer; nothing further to do.
            return;
        }

        self.push(SessionOutput::Cancel(TimerKey::SyncFallback));
        self.surface.restore(&image);
        self.go_live();
    }

    fn fallback_fired(&mut self) {
        if let SyncState::Live = self.state {
            return;
        }
        log::debug!("no snapshot arrived in time, seeding from local state");
        if let Some(image) = self.cache.load() {
            self.surface.restore(&image);
        }
        self.go_live();
    }

    fn candidate_fired(&mut self, req_id: ReqId) {
        if let Some(PendingResponse::Scheduled) = self.pending_responses.get(&req_id) {
            self.pending_responses.remove(&req_id);
            let image = self.surface.capture();
            self.push(SessionOutput::Send(
                Message::SnapshotResponse {
                    req_id,
                    responder_id: self.client_id.clone(),
                    image,
                }
                .encode(),
            ));
        }
    }

    fn deferred_deadline_fired(&mut self, req_id: ReqId) {
        if let Some(PendingResponse::Deferred) = self.pending_responses.get(&req_id) {
            // Still syncing past the ceiling; proceed regardless.
            self.pending_responses.remove(&req_id);
            self.schedule_candidate(req_id);
        }
    }

    fn cache_save_fired(&mut self) {
        if self.cache_save_armed {
            self.cache_save_armed = false;
            let image = self.surface.capture();
            self.cache.store(&image);
        }
    }

    /// Seeds are in; leave `Syncing`, wake deferred candidacies, then replay
    /// the queue through the normal entry point. The state is already `Live`
    /// during replay, so replayed deltas cannot re-queue.
    fn go_live(&mut self) {
        let queued = match std::mem::replace(&mut self.state, SyncState::Live) {
            SyncState::Syncing { queued, .. } => queued,
            SyncState::Live => Vec::new(),
        };
        self.promote_deferred();
        for raw in queued {
            self.handle_frame(&raw);
        }
    }

    fn promote_deferred(&mut self) {
        let deferred: Vec<ReqId> = self
            .pending_responses
            .iter()
            .filter(|(_, pending)| matches!(pending, PendingResponse::Deferred))
            .map(|(req_id, _)| req_id.clone())
            .collect();
        for req_id in deferred {
            self.pending_responses.remove(&req_id);
            self.push(SessionOutput::Cancel(TimerKey::DeferredResponse(
                req_id.clone(),
            )));
            self.schedule_candidate(req_id);
        }
    }

    fn schedule_candidate(&mut self, req_id: ReqId) {
        let delay_ms = response_delay_ms(&req_id, &self.client_id);
        self.pending_responses
            .insert(req_id.clone(), PendingResponse::Scheduled);
        self.push(SessionOutput::Schedule {
            key: TimerKey::CandidateResponse(req_id),
            delay_ms,
        });
    }

    /// Idempotent: a req id whose timer already fired or was cancelled is a
    /// no-op.
    fn cancel_pending_response(&mut self, req_id: &str) {
        match self.pending_responses.remove(req_id) {
            Some(PendingResponse::Scheduled) => self.push(SessionOutput::Cancel(
                TimerKey::CandidateResponse(req_id.to_string()),
            )),
            Some(PendingResponse::Deferred) => self.push(SessionOutput::Cancel(
                TimerKey::DeferredResponse(req_id.to_string()),
            )),
            None => {}
        }
    }

    fn cancel_all_timers(&mut self) {
        if self.is_syncing() {
            self.push(SessionOutput::Cancel(TimerKey::SyncFallback));
        }
        let pending: Vec<ReqId> = self.pending_responses.keys().cloned().collect();
        for req_id in pending {
            self.cancel_pending_response(&req_id);
        }
        if self.cache_save_armed {
            self.cache_save_armed = false;
            self.push(SessionOutput::Cancel(TimerKey::CacheSave));
        }
    }

    fn arm_cache_save(&mut self) {
        if !self.cache_save_armed {
            self.cache_save_armed = true;
            self.push(SessionOutput::Schedule {
                key: TimerKey::CacheSave,
                delay_ms: CACHE_SAVE_DEBOUNCE_MS,
            });
        }
    }

    fn push(&mut self, output: SessionOutput) {
        self.outputs.push_back(output);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot_cache::NoCache;

    #[derive(Default)]
    struct TestSurface {
        drawn: Vec<Delta>,
        base: Option<SnapshotImage>,
    }

    impl PaintSurface for TestSurface {
        fn size(&self) -> (u32, u32) {
            (800, 600)
        }

        fn draw(&mut self, delta: &Delta) {
            self.drawn.push(delta.clone());
        }

        fn capture(&self) -> SnapshotImage {
            SnapshotImage {
                header: "data:image/webp;base64".into(),
                payload: format!("deltas:{}", self.drawn.len()),
            }
        }

        fn restore(&mut self, image: &SnapshotImage) {
            self.base = Some(image.clone());
            self.drawn.clear();
        }
    }

    fn session() -> ClientSession<TestSurface, NoCache> {
        ClientSession::with_client_id(
            "deadbeefdeadbeef".into(),
            TestSurface::default(),
            NoCache,
        )
    }

    fn requested_req_id(outputs: &[SessionOutput]) -> ReqId {
        outputs
            .iter()
            .find_map(|output| match output {
                SessionOutput::Send(raw) => match Message::decode(raw) {
                    Some(Message::SnapshotRequest { req_id, .. }) => Some(req_id),
                    _ => None,
                },
                _ => None,
            })
            .expect("connected() must emit a snapshot request")
    }

    #[test]
    fn it_announces_and_requests_on_connect() {
        let mut session = session();
        session.connected();
        let outputs = session.consume_outputs();

        assert!(session.is_syncing());
        assert_eq!(
            outputs[0],
            SessionOutput::Send("H|deadbeefdeadbeef".into())
        );
        let req_id = requested_req_id(&outputs);
        assert!(outputs.contains(&SessionOutput::Send(format!(
            "R|{}|deadbeefdeadbeef|800|600",
            req_id
        ))));
        assert!(outputs.contains(&SessionOutput::Schedule {
            key: TimerKey::SyncFallback,
            delay_ms: SYNC_FALLBACK_MS,
        }));
    }

    #[test]
    fn it_queues_deltas_while_syncing_and_applies_them_live() {
        let mut session = session();
        session.connected();
        session.handle_frame("P|1|2|3|ff0000");
        assert!(session.surface().drawn.is_empty());

        session.timer_fired(TimerKey::SyncFallback);
        assert!(!session.is_syncing());
        assert_eq!(session.surface().drawn.len(), 1);

        session.handle_frame("P|4|5|6|00ff00");
        assert_eq!(session.surface().drawn.len(), 2);
    }

    #[test]
    fn it_ignores_out_of_bounds_deltas() {
        let mut session = session();
        session.handle_frame("P|800|0|3|ff0000");
        session.handle_frame("P|-1|0|3|ff0000");
        assert!(session.surface().drawn.is_empty());
    }

    #[test]
    fn it_ignores_its_own_snapshot_request() {
        let mut session = session();
        session.handle_frame("R|req-1|deadbeefdeadbeef|800|600");
        assert!(!session.has_pending_response("req-1"));
    }

    #[test]
    fn it_ignores_a_stale_response_after_going_live() {
        let mut session = session();
        session.connected();
        let req_id = requested_req_id(&session.consume_outputs());
        session.timer_fired(TimerKey::SyncFallback);

        session.handle_frame(&format!(
            "S|{}|0123456789abcdef|data:image/webp;base64|AAAA==",
            req_id
        ));
        assert!(session.surface().base.is_none());
    }

    #[test]
    fn it_debounces_cache_saves() {
        let mut session = session();
        session.handle_frame("P|1|2|3|ff0000");
        session.handle_frame("P|4|5|6|00ff00");
        let schedules = session
            .consume_outputs()
            .into_iter()
            .filter(|output| {
                matches!(
                    output,
                    SessionOutput::Schedule {
                        key: TimerKey::CacheSave,
                        ..
                    }
                )
            })
            .count();
        assert_eq!(schedules, 1);
    }
}
