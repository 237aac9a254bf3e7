//! 消息 ID 生成器
//!
//! 生成形如 `<主机名>-<启动时间戳>-<序号>` 的消息 ID，时间戳与序号均为 36 进制。
//! 主机名和时间戳组成的前缀保证多实例之间不冲突，原子递增的序号保证进程内唯一。

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;

/// 序号初始值
const INIT_INDEX: u64 = 10_000_000;

/// 消息 ID 生成器
///
/// 可在多个任务间共享（`&self` 方法），通常每个通知管理器或渠道持有一个。
#[derive(Debug)]
pub struct MessageIdGenerator {
    index: AtomicU64,
    prefix: RwLock<String>,
}

impl MessageIdGenerator {
    pub fn new() -> Self {
        Self::starting_at(INIT_INDEX)
    }

    fn starting_at(index: u64) -> Self {
        Self {
            index: AtomicU64::new(index),
            prefix: RwLock::new(build_prefix()),
        }
    }

    /// 生成下一个消息 ID
    pub fn next_id(&self) -> String {
        let seq = self.index.fetch_add(1, Ordering::SeqCst).wrapping_add(1);

        // 序号回绕时重新生成前缀，保证回绕后的 ID 仍然唯一
        if seq == 0 {
            let mut prefix = self.prefix.write();
            *prefix = build_prefix();
            self.index.store(INIT_INDEX, Ordering::SeqCst);
        }

        let prefix = self.prefix.read();
        format!("{}{}", prefix, to_base36(u128::from(seq)))
    }
}

impl Default for MessageIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

fn build_prefix() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    format!("{}-{}-", hostname(), to_base36(nanos))
}

fn hostname() -> String {
    std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("COMPUTERNAME"))
        .ok()
        .or_else(|| std::fs::read_to_string("/etc/hostname").ok())
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

fn to_base36(mut n: u128) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

    if n == 0 {
        return "0".to_string();
    }

    let mut buf = Vec::new();
    while n > 0 {
        buf.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    buf.reverse();
    String::from_utf8_lossy(&buf).into_owned()
}
