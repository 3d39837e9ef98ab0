/// 経費機能モジュール
///
/// このモジュールは経費管理に関連するすべての機能を提供します：
/// - 経費の作成、読み取り、更新、削除（CRUD操作）
/// - 領収書のアップロードと添付
/// - 承認・却下の終端遷移
/// - 月別・カテゴリ別のダッシュボード集計
// サブモジュールの宣言
pub mod models;
pub mod service;

// 公開インターフェース：外部から使用可能な型と関数をエクスポート
pub use models::{
    CategoryTotal, DashboardStats, Expense, ExpenseCategory, ExpenseForm, ExpenseStatus,
    ExpenseUpdate, MonthlyTotal,
};
pub use service::{compute_stats, ExpenseService};
