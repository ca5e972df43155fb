//! 层级刷新回调

use crate::command::CommandStore;
use domain::Tier;
use std::sync::Arc;

/// 变量消费者。层级刷新后同步调用，调用期间 broker 持有所有已注册的外部锁，
/// 回调内不要再去获取这些锁。
pub trait UpdateCallback: Send + Sync {
    fn notify(&self, store: &CommandStore, tier: Tier);
}

/// 单个层级的回调列表，按注册顺序通知。
#[derive(Clone, Default)]
pub struct CallbackStore {
    callbacks: Vec<Arc<dyn UpdateCallback>>,
}

impl CallbackStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, callback: Arc<dyn UpdateCallback>) {
        self.callbacks.push(callback);
    }

    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    /// 依次通知全部回调。
    pub fn notify_all(&self, store: &CommandStore, tier: Tier) {
        for callback in &self.callbacks {
            callback.notify(store, tier);
        }
    }
}

impl std::fmt::Debug for CallbackStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackStore")
            .field("callbacks", &self.callbacks.len())
            .finish()
    }
}
