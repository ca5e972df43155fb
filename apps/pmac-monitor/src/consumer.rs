//! 把变量变化写入日志的消费者。

use domain::Tier;
use parking_lot::Mutex;
use pmac_storage::{CommandStore, UpdateCallback};
use std::collections::HashMap;
use tracing::info;

pub struct LoggingConsumer {
    variables: Vec<String>,
    last: Mutex<HashMap<String, String>>,
}

impl LoggingConsumer {
    pub fn new(variables: Vec<String>) -> Self {
        Self {
            variables,
            last: Mutex::new(HashMap::new()),
        }
    }

    /// 与上次通知相比发生变化的变量。
    fn changes(&self, store: &CommandStore) -> Vec<(String, String)> {
        let mut last = self.last.lock();
        let mut changed = Vec::new();
        for name in &self.variables {
            let value = store.read_value(name);
            if last.get(name).map(String::as_str) != Some(value) {
                last.insert(name.clone(), value.to_string());
                changed.push((name.clone(), value.to_string()));
            }
        }
        changed
    }
}

impl UpdateCallback for LoggingConsumer {
    fn notify(&self, store: &CommandStore, tier: Tier) {
        for (name, value) in self.changes(store) {
            info!(
                target: "pmac.monitor",
                tier = %tier,
                variable = %name,
                value = %value,
                "variable_changed"
            );
        }
    }
}
