//! 带过期时间的内存缓存
//!
//! 为各渠道的访问令牌等短期数据提供进程内缓存。
//!
//! 过期条目不做后台清理，只在读取时惰性删除。

use std::time::Duration;

use dashmap::DashMap;
use thiserror::Error;
use tokio::time::Instant;

/// 缓存查询错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    #[error("缓存键不存在")]
    NotFound,

    #[error("缓存键已过期")]
    Expired,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: String,
    /// None 表示永不过期
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// 过期键值缓存
///
/// 所有方法均可在多个任务间并发调用，调用方无需额外加锁。
#[derive(Debug, Default)]
pub struct ExpiringCache {
    entries: DashMap<String, CacheEntry>,
}

impl ExpiringCache {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// 写入缓存，覆盖已有值
    ///
    /// `ttl_secs` 为 0 表示永不过期，超出时钟表示范围的 TTL 同样视为永不过期。
    pub fn set(&self, key: impl Into<String>, value: impl Into<String>, ttl_secs: u64) {
        let expires_at = if ttl_secs == 0 {
            None
        } else {
            Instant::now().checked_add(Duration::from_secs(ttl_secs))
        };
        self.entries.insert(
            key.into(),
            CacheEntry {
                value: value.into(),
                expires_at,
            },
        );
    }

    /// 读取缓存
    ///
    /// 命中已过期条目时顺带删除并返回 `CacheError::Expired`，
    /// 之后再读同一个键会得到 `CacheError::NotFound`。
    pub fn get(&self, key: &str) -> Result<String, CacheError> {
        let now = Instant::now();

        {
            // 读引用必须在 remove_if 之前释放，否则同一分段会死锁
            let Some(entry) = self.entries.get(key) else {
                return Err(CacheError::NotFound);
            };
            if !entry.is_expired(now) {
                return Ok(entry.value.clone());
            }
        }

        // 只删除仍处于过期状态的条目，避免误删并发写入的新值
        self.entries.remove_if(key, |_, entry| entry.is_expired(now));
        Err(CacheError::Expired)
    }

    /// 当前条目数（包含尚未被惰性清理的过期条目）
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// 缓存键生成器
pub struct CacheKey;

impl CacheKey {
    pub fn lark_token(app_id: &str) -> String {
        format!("lark:token:{}", app_id)
    }
}
