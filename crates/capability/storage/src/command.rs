//! 变量命令存储
//!
//! 合并命令按存储的迭代顺序生成，响应按 CR 拆分后逐位对应回变量名。
//! 变量较多时拆成多条命令，每条至多 [`MAX_REQUESTS_PER_COMMAND`] 个名字。

use crate::error::StoreError;
use domain::KvStore;
use std::fmt::Write;

/// 单条命令携带的最大变量数
pub const MAX_REQUESTS_PER_COMMAND: usize = 40;

#[derive(Debug, Clone, Default)]
pub struct CommandStore {
    values: KvStore<String, String>,
    commands: Vec<String>,
}

impl CommandStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册变量，初始值为空串。重复注册不改变顺序和当前值。
    pub fn add_item(&mut self, name: &str) {
        if self.values.contains_key(name) {
            return;
        }
        self.values.insert(name.to_string(), String::new());
        self.rebuild_commands();
    }

    /// 注销变量，返回是否存在。
    pub fn delete_item(&mut self, name: &str) -> bool {
        let removed = self.values.remove(name).is_some();
        if removed {
            self.rebuild_commands();
        }
        removed
    }

    pub fn check_for_item(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// 最近一次读取值；未注册的变量返回空串。
    pub fn read_value(&self, name: &str) -> &str {
        self.values.get(name).map(String::as_str).unwrap_or("")
    }

    pub fn size(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// 全部变量名以空格连接的合并命令。
    pub fn build_command(&self) -> String {
        let names: Vec<&str> = self.values.keys().map(String::as_str).collect();
        names.join(" ")
    }

    /// 分块后的命令，每块一次线上事务。
    pub fn command_strings(&self) -> &[String] {
        &self.commands
    }

    fn rebuild_commands(&mut self) {
        let names: Vec<&str> = self.values.keys().map(String::as_str).collect();
        self.commands = names
            .chunks(MAX_REQUESTS_PER_COMMAND)
            .map(|chunk| chunk.join(" "))
            .collect();
    }

    /// 用整条响应更新全部变量（对应 [`Self::build_command`]）。
    pub fn update_reply(&mut self, reply: &str) -> Result<usize, StoreError> {
        let names: Vec<String> = self.values.keys().cloned().collect();
        self.apply(names.iter().map(String::as_str), reply)
    }

    /// 用一条分块命令的响应更新该块内的变量。
    pub fn update_chunk(&mut self, command: &str, reply: &str) -> Result<usize, StoreError> {
        let names: Vec<String> = command.split_whitespace().map(str::to_string).collect();
        self.apply(names.iter().map(String::as_str), reply)
    }

    /// 按位置写入，返回写入的变量数。
    ///
    /// 只计 CR 之前的片段，最后一个 CR 之后的内容不算一行。行数不一致时
    /// 仍写入能对齐的前若干个，其余保持原值，并返回 `ProtocolMismatch`。
    fn apply<'a>(
        &mut self,
        names: impl ExactSizeIterator<Item = &'a str>,
        reply: &str,
    ) -> Result<usize, StoreError> {
        let expected = names.len();
        let mut segments: Vec<&str> = reply.split('\r').collect();
        segments.pop();
        let received = segments.len();

        let mut updated = 0;
        for (name, segment) in names.zip(segments.iter()) {
            if let Some(value) = self.values.get_mut(name) {
                value.clear();
                value.push_str(segment);
                updated += 1;
            }
        }

        if expected != received {
            return Err(StoreError::ProtocolMismatch {
                expected,
                received,
                updated,
            });
        }
        Ok(updated)
    }

    /// 按注册顺序遍历 (name, value)。
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    /// 每行一个 `[name] => value`。
    pub fn report(&self) -> String {
        let mut out = String::new();
        for (name, value) in self.entries() {
            let _ = writeln!(out, "[{}] => {}", name, value);
        }
        out
    }

    /// 名字包含 `substring` 且值非 "0" 的变量，格式为 `name=value `，
    /// 最后从结果中删去所有 `remove` 子串。
    pub fn variables_list(&self, substring: &str, remove: &str) -> String {
        let mut out = String::new();
        for (name, value) in self.entries() {
            if name.contains(substring) && value != "0" {
                let _ = write!(out, "{}={} ", name, value);
            }
        }
        if remove.is_empty() {
            out
        } else {
            out.replace(remove, "")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with(names: &[&str]) -> CommandStore {
        let mut store = CommandStore::new();
        for name in names {
            store.add_item(name);
        }
        store
    }

    #[test]
    fn duplicate_add_is_ignored() {
        let mut store = store_with(&["A", "B"]);
        store.update_reply("1\r2\r").unwrap();
        store.add_item("A");
        assert_eq!(store.size(), 2);
        assert_eq!(store.read_value("A"), "1");
        assert_eq!(store.build_command(), "A B");
    }

    #[test]
    fn unknown_name_reads_empty() {
        let store = store_with(&["P1"]);
        assert_eq!(store.read_value("P2"), "");
        assert_eq!(store.read_value("P1"), "");
    }

    #[test]
    fn commands_split_every_forty_names() {
        let names: Vec<String> = (0..85).map(|i| format!("P{}", i)).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let store = store_with(&refs);
        let commands = store.command_strings();
        assert_eq!(commands.len(), 3);
        assert_eq!(commands[0].split(' ').count(), 40);
        assert_eq!(commands[2], "P80 P81 P82 P83 P84");
        assert!(commands[1].starts_with("P40 "));
    }

    #[test]
    fn delete_rebuilds_command() {
        let mut store = store_with(&["A", "B", "C"]);
        assert!(store.delete_item("B"));
        assert!(!store.delete_item("B"));
        assert_eq!(store.build_command(), "A C");
        assert_eq!(store.command_strings(), &["A C".to_string()]);
        assert!(!store.check_for_item("B"));
    }

    #[test]
    fn empty_store_has_no_commands() {
        let store = CommandStore::new();
        assert!(store.command_strings().is_empty());
        assert_eq!(store.build_command(), "");
    }

    #[test]
    fn chunk_update_touches_only_its_names() {
        let mut store = store_with(&["A", "B", "C"]);
        assert_eq!(store.update_chunk("C A", "3\r1\r"), Ok(2));
        assert_eq!(store.read_value("A"), "1");
        assert_eq!(store.read_value("B"), "");
        assert_eq!(store.read_value("C"), "3");
    }

    #[test]
    fn variables_list_filters_and_strips() {
        let mut store = store_with(&["&2Q81", "&2Q82", "&2Q83", "P1"]);
        store.update_reply("0\r5\r7\r9\r").unwrap();
        assert_eq!(store.variables_list("Q8", "&2"), "Q82=5 Q83=7 ");
        assert_eq!(store.variables_list("P", ""), "P1=9 ");
    }

    #[test]
    fn report_lists_in_order() {
        let mut store = store_with(&["X", "Y"]);
        store.update_reply("1\r2\r").unwrap();
        assert_eq!(store.report(), "[X] => 1\n[Y] => 2\n");
    }
}
