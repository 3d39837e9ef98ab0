//! メッセージ機能のデータモデル

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// メッセージ
///
/// 会話やスレッドのエンティティは存在せず、フラットなメッセージ表から
/// 派生ビューとして組み立てる。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub sender_id: String,
    /// `None` は全ユーザー宛のブロードキャスト
    #[serde(default)]
    pub receiver_id: Option<String>,
    pub content: String,
    /// 添付ファイル名のJSONエンコード済みリスト
    #[serde(default)]
    pub attachments: Option<String>,
    pub read: bool,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn is_broadcast(&self) -> bool {
        self.receiver_id.is_none()
    }

    /// 添付ファイル名を復元する（壊れたJSONは空リスト扱い）
    pub fn attachment_names(&self) -> Vec<String> {
        self.attachments
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok())
            .unwrap_or_default()
    }
}

/// メッセージ送信フォーム
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageForm {
    /// `None` でブロードキャスト
    pub receiver_id: Option<String>,
    pub content: String,
    /// 添付ファイル名のリスト
    #[serde(default)]
    pub attachments: Option<Vec<String>>,
}
