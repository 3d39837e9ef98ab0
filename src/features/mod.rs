/// 機能モジュール
///
/// エンティティごとに1モジュール。各モジュールは `models`（データ型）と
/// `service`（プラットフォーム呼び出しと正規化）で構成される。
pub mod auth;
pub mod expenses;
pub mod files;
pub mod messages;
pub mod notifications;
