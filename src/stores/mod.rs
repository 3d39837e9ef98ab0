/// クライアント状態ストア
///
/// エンティティ系列ごとに1ストア。直近の取得結果をキャッシュし、
/// ミューテーション成功後は再取得せずにローカル状態を楽観的にパッチ
/// する。各ストアはUI層が排他的に所有する前提で `&mut self` の
/// アクションを公開し、同時アクセスのためのロックは持たない。
pub mod auth;
pub mod expenses;
pub mod messages;
pub mod notifications;

pub use auth::AuthStore;
pub use expenses::ExpensesStore;
pub use messages::MessagesStore;
pub use notifications::NotificationsStore;
