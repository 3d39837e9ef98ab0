/// 通知機能モジュール
///
/// このモジュールは通知の配信と既読追跡に関連する機能を提供します：
/// - 全体宛・宛先指定の通知作成
/// - 2段階読み取りによる宛先選別
/// - ユーザーごとに独立した既読マップの管理
/// - 経費審査結果・アナウンスのテンプレート送信
// サブモジュールの宣言
pub mod models;
pub mod service;

// 公開インターフェース：外部から使用可能な型をエクスポート
pub use models::{Notification, NotificationForm, Priority};
pub use service::{NotificationService, TARGET_OVER_FETCH};
