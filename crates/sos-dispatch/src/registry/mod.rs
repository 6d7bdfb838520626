//! 能力注册表：键集合 → 共享实现，按最小相似度解析并缓存结果。
//!
//! # 教案式解读
//! - **意图（Why）**：
//!   - 解码器、编码器、异常格式化器与写出器四类组件共享同一套“谁最具体谁胜出”的解析规则；
//!   - 注册发生在启动或重载时，解析发生在每个请求上，读路径必须无锁。
//! - **实现策略（How）**：
//!   - 条目表与解析缓存组成不可变快照，经 `ArcSwap` 整体替换；写者之间以 `parking_lot::Mutex` 串行化；
//!   - 缓存为快照私有的 `DashMap`，替换快照即丢弃全部缓存，读者永远看不到“新条目 + 旧缓存”的组合；
//!   - 并发未命中时多个线程可能重复扫描并写入同一结果，结果一致，竞争无害。
//! - **契约（What）**：
//!   - 最小非负相似度胜出；同分时先注册者胜出；
//!   - 只缓存命中结果，未命中每次都会重新扫描；
//!   - 注册失败时旧快照保持不变。

use std::{
    borrow::Cow,
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use arc_swap::ArcSwap;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::{
    capability::{CapabilityKey, TypeKey, TypeTag},
    error::{CoreError, Result, codes},
};

/// 键结构相等但实现不同时的处理策略。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// 以 `registry.duplicate_key` 拒绝整个注册批次。
    #[default]
    Reject,
    /// 后注册者替换先注册者，保留原位置。
    Replace,
}

/// 一次注册：若干键共享同一实现。
pub struct Registration<K, T: ?Sized> {
    keys: Vec<K>,
    implementation: Arc<T>,
}

impl<K, T: ?Sized> Registration<K, T> {
    pub fn new(keys: impl IntoIterator<Item = K>, implementation: Arc<T>) -> Self {
        Self {
            keys: keys.into_iter().collect(),
            implementation,
        }
    }

    pub fn keys(&self) -> &[K] {
        &self.keys
    }

    pub fn implementation(&self) -> &Arc<T> {
        &self.implementation
    }
}

impl<K: Clone, T: ?Sized> Clone for Registration<K, T> {
    fn clone(&self) -> Self {
        Self {
            keys: self.keys.clone(),
            implementation: Arc::clone(&self.implementation),
        }
    }
}

impl<K: fmt::Debug, T: ?Sized> fmt::Debug for Registration<K, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("keys", &self.keys)
            .finish_non_exhaustive()
    }
}

struct Entry<K, T: ?Sized> {
    key: K,
    implementation: Arc<T>,
}

impl<K: Clone, T: ?Sized> Clone for Entry<K, T> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            implementation: Arc::clone(&self.implementation),
        }
    }
}

struct Snapshot<K: CapabilityKey, T: ?Sized> {
    entries: Vec<Entry<K, T>>,
    cache: DashMap<K, Arc<T>>,
}

impl<K: CapabilityKey, T: ?Sized> Snapshot<K, T> {
    fn new(entries: Vec<Entry<K, T>>) -> Self {
        Self {
            entries,
            cache: DashMap::new(),
        }
    }
}

/// `CapabilityRegistry` 是泛型的“能力键 → 实现”解析表。
///
/// # 契约说明（What）
/// - `K` 决定相似度语义，`T` 通常为 `dyn Decoder` 之类的 trait object；
/// - `resolve` 对相等的查找键幂等，第二次起由缓存命中，可通过 [`scan_count`](Self::scan_count) 观察；
/// - 实例满足 `Send + Sync`，以 `Arc` 在请求线程间共享。
///
/// ```rust
/// use std::sync::Arc;
/// use sos_dispatch::capability::{TypeKey, builtin};
/// use sos_dispatch::registry::{CapabilityRegistry, Registration};
///
/// let registry: CapabilityRegistry<TypeKey, str> = CapabilityRegistry::new("demo");
/// registry
///     .register(Registration::new([TypeKey::new(&builtin::DOCUMENT)], Arc::from("generic")))
///     .unwrap();
/// let hit = registry.resolve_for_type(&builtin::JSON_DOCUMENT).unwrap();
/// assert_eq!(&*hit, "generic");
/// ```
pub struct CapabilityRegistry<K: CapabilityKey, T: ?Sized> {
    name: Cow<'static, str>,
    policy: DuplicatePolicy,
    snapshot: ArcSwap<Snapshot<K, T>>,
    write_lock: Mutex<()>,
    scans: AtomicU64,
}

impl<K, T> CapabilityRegistry<K, T>
where
    K: CapabilityKey,
    T: ?Sized + Send + Sync,
{
    /// 以默认的 [`DuplicatePolicy::Reject`] 构造空注册表。
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self::with_policy(name, DuplicatePolicy::default())
    }

    pub fn with_policy(name: impl Into<Cow<'static, str>>, policy: DuplicatePolicy) -> Self {
        Self {
            name: name.into(),
            policy,
            snapshot: ArcSwap::from_pointee(Snapshot::new(Vec::new())),
            write_lock: Mutex::new(()),
            scans: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn policy(&self) -> DuplicatePolicy {
        self.policy
    }

    /// 追加一次注册并发布新快照。
    pub fn register(&self, registration: Registration<K, T>) -> Result<()> {
        self.register_all([registration])
    }

    /// 原子地追加多次注册：要么全部可见，要么（出错时）全部不可见。
    pub fn register_all(
        &self,
        registrations: impl IntoIterator<Item = Registration<K, T>>,
    ) -> Result<()> {
        let _writer = self.write_lock.lock();
        let base = self.snapshot.load().entries.clone();
        let entries = self.merge(base, registrations)?;
        self.publish(entries);
        Ok(())
    }

    /// 以全新的注册集合整体替换当前内容，用于配置重载。
    pub fn replace_all(
        &self,
        registrations: impl IntoIterator<Item = Registration<K, T>>,
    ) -> Result<()> {
        let _writer = self.write_lock.lock();
        let entries = self.merge(Vec::new(), registrations)?;
        self.publish(entries);
        Ok(())
    }

    /// 校验一批注册能否整体替换当前内容，不发布。
    pub fn validate(
        &self,
        registrations: impl IntoIterator<Item = Registration<K, T>>,
    ) -> Result<()> {
        self.merge(Vec::new(), registrations).map(|_| ())
    }

    fn merge(
        &self,
        mut entries: Vec<Entry<K, T>>,
        registrations: impl IntoIterator<Item = Registration<K, T>>,
    ) -> Result<Vec<Entry<K, T>>> {
        for registration in registrations {
            if registration.keys.is_empty() {
                return Err(CoreError::new(
                    codes::REGISTRY_EMPTY_KEYS,
                    format!("注册表 `{}` 收到没有任何键的注册", self.name),
                ));
            }
            for key in registration.keys {
                let existing = entries.iter_mut().find(|entry| entry.key == key);
                match existing {
                    Some(entry) if Arc::ptr_eq(&entry.implementation, &registration.implementation) => {}
                    Some(entry) => match self.policy {
                        DuplicatePolicy::Reject => {
                            return Err(CoreError::new(
                                codes::REGISTRY_DUPLICATE_KEY,
                                format!("注册表 `{}` 中键 `{key}` 已由其他实现占用", self.name),
                            ));
                        }
                        DuplicatePolicy::Replace => {
                            warn!(registry = %self.name, key = %key, "替换已注册的实现");
                            entry.implementation = Arc::clone(&registration.implementation);
                        }
                    },
                    None => entries.push(Entry {
                        key,
                        implementation: Arc::clone(&registration.implementation),
                    }),
                }
            }
        }
        Ok(entries)
    }

    fn publish(&self, entries: Vec<Entry<K, T>>) {
        let size = entries.len();
        self.snapshot.store(Arc::new(Snapshot::new(entries)));
        info!(registry = %self.name, keys = size, "发布新的注册快照");
    }

    /// 解析与查找键最相近的实现。
    ///
    /// # 逻辑解析（How）
    /// 1. 命中缓存直接返回；
    /// 2. 否则按注册顺序扫描，保留分数严格更小者，因而同分时先注册者胜出，遇到 0 分提前结束；
    /// 3. 命中结果写入当前快照的缓存。
    pub fn resolve(&self, lookup: &K) -> Option<Arc<T>> {
        let snapshot = self.snapshot.load();
        if let Some(hit) = snapshot.cache.get(lookup) {
            return Some(Arc::clone(hit.value()));
        }

        self.scans.fetch_add(1, Ordering::Relaxed);
        let mut best: Option<(u32, &Entry<K, T>)> = None;
        for entry in &snapshot.entries {
            let Some(score) = lookup.similarity_to(&entry.key).score() else {
                continue;
            };
            if best.is_none_or(|(current, _)| score < current) {
                best = Some((score, entry));
                if score == 0 {
                    break;
                }
            }
        }

        match best {
            Some((score, entry)) => {
                debug!(registry = %self.name, lookup = %lookup, matched = %entry.key, score, "解析命中");
                snapshot
                    .cache
                    .insert(lookup.clone(), Arc::clone(&entry.implementation));
                Some(Arc::clone(&entry.implementation))
            }
            None => {
                debug!(registry = %self.name, lookup = %lookup, "解析未命中");
                None
            }
        }
    }

    /// 与 [`resolve`](Self::resolve) 相同，未命中时返回 `UnsupportedRepresentation`。
    pub fn require(&self, lookup: &K) -> Result<Arc<T>> {
        self.resolve(lookup).ok_or_else(|| {
            CoreError::unsupported(format!("注册表 `{}` 中没有组件支持 `{lookup}`", self.name))
        })
    }

    /// 累计的条目扫描次数（缓存命中不计）。
    pub fn scan_count(&self) -> u64 {
        self.scans.load(Ordering::Relaxed)
    }

    /// 按注册顺序返回全部键。
    pub fn keys(&self) -> Vec<K> {
        self.snapshot
            .load()
            .entries
            .iter()
            .map(|entry| entry.key.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.snapshot.load().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 当前快照中已缓存的查找键数量。
    pub fn cached_len(&self) -> usize {
        self.snapshot.load().cache.len()
    }
}

impl<T> CapabilityRegistry<TypeKey, T>
where
    T: ?Sized + Send + Sync,
{
    /// 按负载类型标签解析，最具体的已注册类型胜出。
    pub fn resolve_for_type(&self, tag: &'static TypeTag) -> Option<Arc<T>> {
        self.resolve(&TypeKey::new(tag))
    }
}

impl<K: CapabilityKey, T: ?Sized> fmt::Debug for CapabilityRegistry<K, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilityRegistry")
            .field("name", &self.name)
            .field("policy", &self.policy)
            .field("keys", &self.snapshot.load().entries.len())
            .field("scans", &self.scans.load(Ordering::Relaxed))
            .finish()
    }
}
