// Session registry: raid lookup, per-raid serialization and deferred task scheduling.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::broadcast;

use crate::metrics;

use super::action::{ActionEnvelope, RaidAction, RaidEvent};
use super::error::{RaidError, RaidResult};
use super::raid::{RaidSession, RaidSettings, RaidSnapshot, RaidSummary};
use super::turn::ScheduledTask;

/// Buffered events per raid before slow subscribers start lagging.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// How many destroyed raid ids are remembered for diagnostics.
const RETIRED_ID_MEMORY: usize = 256;

/// Registry-wide limits and the defaults handed to new raids.
#[derive(Debug, Clone)]
pub struct RegistrySettings {
    pub raid: RaidSettings,
    pub max_raids: usize,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        RegistrySettings {
            raid: RaidSettings::default(),
            max_raids: 100,
        }
    }
}

/// One live raid: its session behind a FIFO async lock plus its event fan-out.
pub struct RaidHandle {
    id: String,
    session: tokio::sync::Mutex<RaidSession>,
    events: broadcast::Sender<RaidEvent>,
    retired: AtomicBool,
    /// Reached victory or defeat; evictable when the registry is full.
    finished: AtomicBool,
}

impl RaidHandle {
    fn new(session: RaidSession) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        RaidHandle {
            id: session.id().to_string(),
            session: tokio::sync::Mutex::new(session),
            events,
            retired: AtomicBool::new(false),
            finished: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RaidEvent> {
        self.events.subscribe()
    }

    /// Fan events out to subscribers. Rejections only ever go back to the sender.
    /// Callers hold the session guard so subscribers see processing order.
    fn publish(&self, events: &[RaidEvent]) {
        for event in events.iter().filter(|e| !e.is_rejection()) {
            // No subscribers is fine
            let _ = self.events.send(event.clone());
        }
    }

    /// Post-action bookkeeping, run under the session guard.
    fn settle(self: &Arc<Self>, session: &mut RaidSession, events: &[RaidEvent]) {
        self.publish(events);
        schedule(self, session.take_scheduled());
        self.finished
            .store(session.phase().is_terminal(), Ordering::SeqCst);
    }
}

/// Result of routing one envelope.
#[derive(Debug, Clone)]
pub struct Dispatched {
    /// The raid the action landed in, if any.
    pub raid_id: Option<String>,
    pub events: Vec<RaidEvent>,
}

/// Creates, looks up and destroys raid sessions.
pub struct SessionRegistry {
    raids: Mutex<HashMap<String, Arc<RaidHandle>>>,
    retired: Mutex<VecDeque<String>>,
    settings: RegistrySettings,
}

impl SessionRegistry {
    pub fn new(settings: RegistrySettings) -> Self {
        SessionRegistry {
            raids: Mutex::new(HashMap::new()),
            retired: Mutex::new(VecDeque::new()),
            settings,
        }
    }

    pub fn settings(&self) -> &RegistrySettings {
        &self.settings
    }

    pub fn len(&self) -> usize {
        self.raids.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, raid_id: &str) -> bool {
        self.raids.lock().unwrap().contains_key(raid_id)
    }

    fn lookup(&self, raid_id: &str) -> RaidResult<Arc<RaidHandle>> {
        if let Some(handle) = self.raids.lock().unwrap().get(raid_id) {
            return Ok(handle.clone());
        }
        if self.retired.lock().unwrap().iter().any(|id| id == raid_id) {
            tracing::error!(raid_id, "Action addressed to a raid that no longer exists");
        }
        Err(RaidError::RaidNotFound(raid_id.to_string()))
    }

    /// Subscribe to a raid's event stream.
    pub fn subscribe(&self, raid_id: &str) -> RaidResult<broadcast::Receiver<RaidEvent>> {
        Ok(self.lookup(raid_id)?.subscribe())
    }

    pub async fn snapshot(&self, raid_id: &str) -> RaidResult<RaidSnapshot> {
        let handle = self.lookup(raid_id)?;
        let session = handle.session.lock().await;
        Ok(session.snapshot())
    }

    /// Summaries of every live raid, oldest first.
    pub async fn list(&self) -> Vec<RaidSummary> {
        let handles: Vec<Arc<RaidHandle>> = self.raids.lock().unwrap().values().cloned().collect();
        let mut summaries = Vec::with_capacity(handles.len());
        for handle in handles {
            summaries.push(handle.session.lock().await.summary());
        }
        summaries.sort_by_key(|s| s.created_at);
        summaries
    }

    /// Route one action. Rejections come back as failed `actionResult` events
    /// and are never broadcast.
    pub async fn dispatch(&self, envelope: ActionEnvelope) -> Dispatched {
        let kind = envelope.action.kind();
        let result = match envelope.action {
            RaidAction::CreateRaid {
                config,
                player_data,
            } => self.create(&envelope.player_id, config, player_data),
            action => match envelope.raid_id {
                Some(raid_id) => self.route(&raid_id, &envelope.player_id, action).await,
                None => Err(RaidError::RaidNotFound("<missing raidId>".to_string())),
            },
        };

        let dispatched = match result {
            Ok(dispatched) => dispatched,
            Err(e) => Dispatched {
                raid_id: None,
                events: vec![RaidEvent::rejected(kind, &e)],
            },
        };
        let outcome = if dispatched.events.iter().any(RaidEvent::is_rejection) {
            "rejected"
        } else {
            "ok"
        };
        metrics::ACTIONS_TOTAL
            .with_label_values(&[kind, outcome])
            .inc();
        dispatched
    }

    fn create(
        &self,
        creator_id: &str,
        config: super::raid::RaidConfig,
        player_data: super::player::PlayerData,
    ) -> RaidResult<Dispatched> {
        let raid_id = uuid::Uuid::new_v4().to_string();
        let (mut session, events) = RaidSession::create(
            &raid_id,
            creator_id,
            config,
            player_data,
            &self.settings.raid,
        )?;
        let tasks = session.take_scheduled();
        let handle = Arc::new(RaidHandle::new(session));
        let evicted = {
            let mut raids = self.raids.lock().unwrap();
            let mut evicted = None;
            if raids.len() >= self.settings.max_raids {
                let finished = raids
                    .values()
                    .find(|h| h.finished.load(Ordering::SeqCst))
                    .map(|h| h.id.clone());
                match finished {
                    Some(id) => evicted = raids.remove(&id),
                    None => return Err(RaidError::TooManyRaids(self.settings.max_raids)),
                }
            }
            raids.insert(raid_id.clone(), handle.clone());
            evicted
        };
        if let Some(old) = evicted {
            tracing::info!(raid_id = %old.id, "Evicting finished raid to make room");
            self.retire(&old);
        }

        metrics::ACTIVE_RAIDS.inc();
        metrics::RAIDS_CREATED_TOTAL.inc();
        tracing::info!(raid_id = %raid_id, creator_id, "Raid created");

        // Nobody can be subscribed yet; the creator gets these in the reply.
        schedule(&handle, tasks);
        Ok(Dispatched {
            raid_id: Some(raid_id),
            events,
        })
    }

    async fn route(
        &self,
        raid_id: &str,
        actor: &str,
        action: RaidAction,
    ) -> RaidResult<Dispatched> {
        let handle = self.lookup(raid_id)?;
        let (events, finished) = {
            let mut session = handle.session.lock().await;
            let events = session.handle(actor, action);
            handle.settle(&mut session, &events);
            (events, session.is_empty() || session.is_closed())
        };

        if finished {
            self.destroy(&handle);
        }
        Ok(Dispatched {
            raid_id: Some(raid_id.to_string()),
            events,
        })
    }

    /// Drop a raid. Its pending tasks find it gone and do nothing.
    fn destroy(&self, handle: &Arc<RaidHandle>) {
        let removed = {
            let mut raids = self.raids.lock().unwrap();
            match raids.get(&handle.id) {
                Some(current) if Arc::ptr_eq(current, handle) => raids.remove(&handle.id),
                _ => None,
            }
        };
        if removed.is_none() {
            return;
        }
        self.retire(handle);
    }

    /// Bookkeeping for a raid already taken out of the table.
    fn retire(&self, handle: &Arc<RaidHandle>) {
        handle.retired.store(true, Ordering::SeqCst);
        let mut retired = self.retired.lock().unwrap();
        retired.push_back(handle.id.clone());
        while retired.len() > RETIRED_ID_MEMORY {
            retired.pop_front();
        }
        metrics::ACTIVE_RAIDS.dec();
        tracing::info!(raid_id = %handle.id, "Raid destroyed");
    }
}

/// Spawn a timer per task. Each holds only a weak reference to the raid.
fn schedule(handle: &Arc<RaidHandle>, tasks: Vec<ScheduledTask>) {
    for task in tasks {
        let weak = Arc::downgrade(handle);
        tokio::spawn(async move {
            tokio::time::sleep(task.delay).await;
            fire(weak, task).await;
        });
    }
}

async fn fire(weak: Weak<RaidHandle>, task: ScheduledTask) {
    let Some(handle) = weak.upgrade() else {
        return;
    };
    if handle.retired.load(Ordering::SeqCst) {
        return;
    }
    let mut session = handle.session.lock().await;
    let events = session.fire(task);
    handle.settle(&mut session, &events);
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::engine::player::PlayerData;
    use crate::engine::raid::RaidConfig;
    use crate::engine::turn::Phase;

    fn registry(max_raids: usize) -> SessionRegistry {
        SessionRegistry::new(RegistrySettings {
            raid: RaidSettings {
                boss_turn_delay: Duration::from_millis(10),
                turn_timeout: None,
                debug_default: false,
            },
            max_raids,
        })
    }

    fn create(player: &str, min_players: usize) -> ActionEnvelope {
        ActionEnvelope {
            raid_id: None,
            player_id: player.to_string(),
            action: RaidAction::CreateRaid {
                config: RaidConfig {
                    min_players,
                    seed: Some(1),
                    ..Default::default()
                },
                player_data: PlayerData::default(),
            },
        }
    }

    fn envelope(raid_id: &str, player: &str, action: RaidAction) -> ActionEnvelope {
        ActionEnvelope {
            raid_id: Some(raid_id.to_string()),
            player_id: player.to_string(),
            action,
        }
    }

    #[tokio::test]
    async fn test_create_and_lookup() {
        let registry = registry(4);
        let created = registry.dispatch(create("p1", 2)).await;
        let raid_id = created.raid_id.unwrap();
        assert!(registry.contains(&raid_id));
        assert_eq!(registry.list().await.len(), 1);

        let snapshot = registry.snapshot(&raid_id).await.unwrap();
        assert_eq!(snapshot.phase, Phase::Lobby);
        assert_eq!(snapshot.players.len(), 1);
    }

    #[tokio::test]
    async fn test_too_many_raids() {
        let registry = registry(1);
        registry.dispatch(create("p1", 1)).await;
        let second = registry.dispatch(create("p2", 1)).await;
        assert!(second.raid_id.is_none());
        assert!(second.events[0].is_rejection());
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_raid_rejected() {
        let registry = registry(4);
        let out = registry
            .dispatch(envelope("nope", "p1", RaidAction::LeaveRaid))
            .await;
        match &out.events[0] {
            RaidEvent::ActionResult(r) => assert_eq!(r.error.as_deref(), Some("RaidNotFound")),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_last_leave_destroys_raid() {
        let registry = registry(4);
        let raid_id = registry.dispatch(create("p1", 2)).await.raid_id.unwrap();
        registry
            .dispatch(envelope(&raid_id, "p1", RaidAction::LeaveRaid))
            .await;
        assert!(!registry.contains(&raid_id));
        assert!(registry.subscribe(&raid_id).is_err());
    }

    #[tokio::test]
    async fn test_rejections_not_broadcast() {
        let registry = registry(4);
        let raid_id = registry.dispatch(create("p1", 2)).await.raid_id.unwrap();
        let mut rx = registry.subscribe(&raid_id).unwrap();
        let out = registry
            .dispatch(envelope(&raid_id, "p1", RaidAction::PlayerRetreat))
            .await;
        assert!(out.events[0].is_rejection());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_boss_turn_fires_after_delay() {
        let registry = registry(4);
        let raid_id = registry.dispatch(create("p1", 1)).await.raid_id.unwrap();
        let mut rx = registry.subscribe(&raid_id).unwrap();
        registry
            .dispatch(envelope(
                &raid_id,
                "p1",
                RaidAction::PlayerAttack {
                    attack_name: None,
                    damage: Some(10),
                },
            ))
            .await;

        let boss_event = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                match rx.recv().await {
                    Ok(RaidEvent::BossActionCompleted { .. }) => return true,
                    Ok(_) => continue,
                    Err(_) => return false,
                }
            }
        })
        .await
        .unwrap_or(false);
        assert!(boss_event);

        let snapshot = registry.snapshot(&raid_id).await.unwrap();
        assert_eq!(snapshot.round, 2);
    }

    #[tokio::test]
    async fn test_finished_raid_evicted_when_full() {
        let registry = registry(1);
        let mut envelope = create("p1", 1);
        if let RaidAction::CreateRaid { config, .. } = &mut envelope.action {
            config.debug_mode = Some(true);
        }
        let first = registry.dispatch(envelope).await.raid_id.unwrap();
        registry
            .dispatch(envelope_for_boss_hp(&first, 0))
            .await;
        assert_eq!(
            registry.snapshot(&first).await.unwrap().phase,
            Phase::Victory
        );

        let second = registry.dispatch(create("p2", 1)).await;
        assert!(second.raid_id.is_some());
        assert!(!registry.contains(&first));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_unfinished_raid_not_evicted() {
        let registry = registry(1);
        let first = registry.dispatch(create("p1", 1)).await.raid_id.unwrap();
        let second = registry.dispatch(create("p2", 1)).await;
        assert!(second.raid_id.is_none());
        assert!(registry.contains(&first));
    }

    fn envelope_for_boss_hp(raid_id: &str, hp: u32) -> ActionEnvelope {
        envelope(
            raid_id,
            "p1",
            RaidAction::DebugSetHp {
                player_id: None,
                card_slot: None,
                hp,
            },
        )
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_subscribers_see_processing_order() {
        let registry = Arc::new(registry(4));
        let raid_id = registry.dispatch(create("p1", 20)).await.raid_id.unwrap();
        let mut rx = registry.subscribe(&raid_id).unwrap();

        let joins: Vec<_> = (2..=9)
            .map(|i| {
                let registry = registry.clone();
                let raid_id = raid_id.clone();
                tokio::spawn(async move {
                    registry
                        .dispatch(envelope(
                            &raid_id,
                            &format!("p{i}"),
                            RaidAction::JoinRaid {
                                player_data: PlayerData::default(),
                            },
                        ))
                        .await
                })
            })
            .collect();
        for join in joins {
            join.await.unwrap();
        }

        let mut seats = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let RaidEvent::GameStateUpdate { snapshot } = event {
                seats.push(snapshot.players.len());
            }
        }
        assert_eq!(seats, (2..=9).collect::<Vec<_>>());
    }
}
