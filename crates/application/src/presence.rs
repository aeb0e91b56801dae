use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use domain::{ConnectionId, Identity, PresenceEntry, UserId};
use tokio::sync::RwLock;

use crate::clock::Clock;

/// 在线注册表
///
/// 连接句柄到身份的双向索引，是进程内唯一跨连接共享的可变状态。
/// 所有写操作只经过 `register` / `unregister`，并且在同一把写锁内同时维护正向表和反向索引，
/// 读者不会看到只应用了一半的条目。锁内不做任何 I/O。
pub struct PresenceRegistry {
    state: RwLock<RegistryState>,
    clock: Arc<dyn Clock>,
}

#[derive(Default)]
struct RegistryState {
    entries: HashMap<ConnectionId, Slot>,
    by_user: HashMap<UserId, HashSet<ConnectionId>>,
    next_seq: u64,
}

struct Slot {
    // 插入序号，快照按它排序
    seq: u64,
    entry: PresenceEntry,
}

impl RegistryState {
    fn detach_from_user(&mut self, user_id: UserId, connection_id: ConnectionId) {
        if let Some(connections) = self.by_user.get_mut(&user_id) {
            connections.remove(&connection_id);
            if connections.is_empty() {
                self.by_user.remove(&user_id);
            }
        }
    }

    fn ordered_slots(&self) -> Vec<&Slot> {
        let mut slots: Vec<&Slot> = self.entries.values().collect();
        slots.sort_by_key(|slot| slot.seq);
        slots
    }
}

impl PresenceRegistry {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
            clock,
        }
    }

    /// 插入或覆盖连接的条目，重试安全
    ///
    /// 覆盖同一身份时保留原来的插入顺序和上线时间；身份变化时视为新条目。
    pub async fn register(&self, connection_id: ConnectionId, identity: Identity) {
        let now = self.clock.now();
        let mut state = self.state.write().await;

        let (seq, online_since) = match state.entries.remove(&connection_id) {
            Some(previous) if previous.entry.identity == identity => {
                (previous.seq, previous.entry.online_since)
            }
            Some(previous) => {
                state.detach_from_user(previous.entry.identity.user_id, connection_id);
                state.next_seq += 1;
                (state.next_seq, now)
            }
            None => {
                state.next_seq += 1;
                (state.next_seq, now)
            }
        };

        state
            .by_user
            .entry(identity.user_id)
            .or_default()
            .insert(connection_id);
        state.entries.insert(
            connection_id,
            Slot {
                seq,
                entry: PresenceEntry {
                    connection_id,
                    identity,
                    online_since,
                },
            },
        );
    }

    /// 移除连接的条目并返回被移除的身份；未注册或已移除时返回 None
    pub async fn unregister(&self, connection_id: ConnectionId) -> Option<Identity> {
        let mut state = self.state.write().await;
        let slot = state.entries.remove(&connection_id)?;
        state.detach_from_user(slot.entry.identity.user_id, connection_id);
        Some(slot.entry.identity)
    }

    pub async fn lookup(&self, connection_id: ConnectionId) -> Option<Identity> {
        let state = self.state.read().await;
        state
            .entries
            .get(&connection_id)
            .map(|slot| slot.entry.identity.clone())
    }

    /// 返回绑定到该用户的全部连接（可能为空，也可能有多个设备），按上线顺序
    pub async fn find_connections(&self, user_id: UserId) -> Vec<ConnectionId> {
        let state = self.state.read().await;
        let Some(connections) = state.by_user.get(&user_id) else {
            return Vec::new();
        };
        let mut found: Vec<(u64, ConnectionId)> = connections
            .iter()
            .filter_map(|id| state.entries.get(id).map(|slot| (slot.seq, *id)))
            .collect();
        found.sort_by_key(|(seq, _)| *seq);
        found.into_iter().map(|(_, id)| id).collect()
    }

    /// 当前在线身份列表，每个条目一项，按插入顺序
    pub async fn snapshot(&self) -> Vec<Identity> {
        let state = self.state.read().await;
        state
            .ordered_slots()
            .into_iter()
            .map(|slot| slot.entry.identity.clone())
            .collect()
    }

    /// 当前全部条目（含连接句柄），按插入顺序
    pub async fn entries(&self) -> Vec<PresenceEntry> {
        let state = self.state.read().await;
        state
            .ordered_slots()
            .into_iter()
            .map(|slot| slot.entry.clone())
            .collect()
    }

    /// 广播时使用的连接列表
    pub async fn connections(&self) -> Vec<ConnectionId> {
        let state = self.state.read().await;
        state
            .ordered_slots()
            .into_iter()
            .map(|slot| slot.entry.connection_id)
            .collect()
    }

    /// 在线用户去重列表（多设备的用户只出现一次）
    pub async fn online_users(&self) -> Vec<Identity> {
        let mut seen = HashSet::new();
        self.snapshot()
            .await
            .into_iter()
            .filter(|identity| seen.insert(identity.user_id))
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
