/// メッセージ機能モジュール
///
/// このモジュールはメッセージのやり取りに関連する機能を提供します：
/// - 個人宛・ブロードキャストの送信
/// - 和集合による会話ビューの組み立て
/// - 未読数の集計と既読化（単発・一括）
/// - 最近の連絡先抽出と全文検索
// サブモジュールの宣言
pub mod models;
pub mod service;

// 公開インターフェース：外部から使用可能な型をエクスポート
pub use models::{Message, MessageForm};
pub use service::{MessageService, RECENT_CONTACT_WINDOW};
