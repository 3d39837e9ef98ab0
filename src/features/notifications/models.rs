//! 通知機能のデータモデル

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 通知の優先度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }
}

/// 通知
///
/// 既読状態は `read` フラグではなく、ユーザーIDをキーとするマップで
/// 保持する。受信者ごとの既読追跡が互いに独立する。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub title: String,
    pub content: String,
    pub priority: Priority,
    /// 宛先ユーザーIDのJSONエンコード済みリスト。`None` は全ユーザー宛
    #[serde(default)]
    pub target_users: Option<String>,
    /// ユーザーIDをキーとする既読マップのJSONエンコード済み表現
    #[serde(default)]
    pub read_by: Option<String>,
    pub date: DateTime<Utc>,
    /// 保存されるが現在のところ絞り込みには使われない
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Notification {
    pub fn is_global(&self) -> bool {
        self.target_users.is_none()
    }

    /// この通知が指定ユーザーに見えるか判定する
    ///
    /// 宛先リストのJSONが壊れている場合、その通知は対象ビューから
    /// 除外される（見えない扱い）。
    pub fn is_visible_to(&self, user_id: &str) -> bool {
        match self.target_users.as_deref() {
            None => true,
            Some(raw) => serde_json::from_str::<Vec<String>>(raw)
                .map(|targets| targets.iter().any(|t| t == user_id))
                .unwrap_or(false),
        }
    }

    /// 既読マップを復元する（壊れたJSONや未設定は空マップ扱い）
    pub fn read_state(&self) -> HashMap<String, Value> {
        self.read_by
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok())
            .unwrap_or_default()
    }

    /// 指定ユーザーにとって未読か判定する
    ///
    /// マップに真値のエントリがない場合に限り未読。
    pub fn is_unread_for(&self, user_id: &str) -> bool {
        !self
            .read_state()
            .get(user_id)
            .map(is_truthy)
            .unwrap_or(false)
    }

    /// ローカルキャッシュ上で既読に更新する（ストアの楽観的パッチ用）
    pub fn mark_read_locally(&mut self, user_id: &str) {
        let mut state = self.read_state();
        state.insert(user_id.to_string(), Value::Bool(true));
        if let Ok(encoded) = serde_json::to_string(&state) {
            self.read_by = Some(encoded);
        }
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::Null => false,
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// 通知の作成フォーム
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationForm {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub priority: Option<Priority>,
    /// `None` で全ユーザー宛
    #[serde(default)]
    pub target_users: Option<Vec<String>>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notification(target_users: Option<&str>, read_by: Option<&str>) -> Notification {
        Notification {
            id: "n1".to_string(),
            title: "título".to_string(),
            content: "conteúdo".to_string(),
            priority: Priority::Medium,
            target_users: target_users.map(String::from),
            read_by: read_by.map(String::from),
            date: Utc::now(),
            expires_at: None,
        }
    }

    #[test]
    fn test_visibility() {
        assert!(notification(None, None).is_visible_to("u1"));
        assert!(notification(Some(r#"["u1","u2"]"#), None).is_visible_to("u1"));
        assert!(!notification(Some(r#"["u2"]"#), None).is_visible_to("u1"));
        // 壊れたJSONは対象ビューから除外される
        assert!(!notification(Some("not json"), None).is_visible_to("u1"));
    }

    #[test]
    fn test_unread_invariant() {
        let n = notification(None, Some(r#"{"u1":true}"#));
        assert!(!n.is_unread_for("u1"));
        // 他ユーザーの既読状態は独立している
        assert!(n.is_unread_for("u2"));

        // 偽値のエントリは未読扱い
        let n = notification(None, Some(r#"{"u1":false,"u2":0,"u3":""}"#));
        assert!(n.is_unread_for("u1"));
        assert!(n.is_unread_for("u2"));
        assert!(n.is_unread_for("u3"));

        // 壊れたマップは空扱い（全員未読）
        let n = notification(None, Some("not json"));
        assert!(n.is_unread_for("u1"));
    }

    #[test]
    fn test_mark_read_locally() {
        let mut n = notification(None, Some(r#"{"u2":true}"#));
        n.mark_read_locally("u1");
        assert!(!n.is_unread_for("u1"));
        assert!(!n.is_unread_for("u2"));
    }
}
