/// ファイル機能モジュール
///
/// このモジュールはブロブストレージに関連する機能を提供します：
/// - サイズ・MIMEタイプの検証付きアップロード
/// - アップロード前の画像縮小・再圧縮
/// - 複数ファイルの並行アップロード
/// - 閲覧・ダウンロード・プレビューURLの生成
// サブモジュールの宣言
pub mod models;
pub mod service;

// 公開インターフェース：外部から使用可能な型と定数をエクスポート
pub use models::{
    MultiUploadOutcome, StorageStats, UploadInput, ALLOWED_MIME_TYPES, DEFAULT_JPEG_QUALITY,
    MAX_FILE_SIZE, MAX_IMAGE_HEIGHT, MAX_IMAGE_WIDTH,
};
pub use service::FileService;
