/// 認証・プロフィール機能モジュール
///
/// このモジュールは認証とプロフィール管理に関連する機能を提供します：
/// - ログイン・新規登録・ログアウト
/// - プロフィールの遅延合成（存在保証）
/// - プロフィールの部分更新
/// - パスワード変更・回復
// サブモジュールの宣言
pub mod models;
pub mod service;

// 公開インターフェース：外部から使用可能な型をエクスポート
pub use models::{
    LoginOutcome, ProfileUpdate, RegisterInput, RegisterOutcome, Role, UserProfile,
};
pub use service::AuthService;
