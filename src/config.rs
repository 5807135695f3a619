use crate::error::{Result, SkinAiError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// データベース接続設定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendSettings {
    pub url: String,
    /// service role キーがあればそれを、なければ anon キーを使う
    pub key: String,
    pub uses_service_role: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub api_key: Option<String>,
    pub model: String,
    pub overall_model: String,
    pub supabase_url: Option<String>,
    pub supabase_anon_key: Option<String>,
    pub supabase_service_role_key: Option<String>,
    pub user_id: Option<String>,
    pub max_files: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.into(),
            overall_model: DEFAULT_MODEL.into(),
            supabase_url: None,
            supabase_anon_key: None,
            supabase_service_role_key: None,
            user_id: None,
            max_files: skin_ai_common::intake::DEFAULT_MAX_FILES,
        }
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = serde_json::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| SkinAiError::Config("ホームディレクトリが見つかりません".into()))?;
        Ok(home.join(".config").join("skin-ai").join("config.json"))
    }

    /// 環境変数の値で上書きした設定を返す
    pub fn with_env(self) -> Self {
        self.with_overrides(env_var)
    }

    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        // 環境変数を優先
        if let Some(key) = lookup("GEMINI_API_KEY").or_else(|| lookup("API_KEY")) {
            self.api_key = Some(key);
        }
        if let Some(url) = lookup("SUPABASE_URL") {
            self.supabase_url = Some(url);
        }
        if let Some(key) = lookup("SUPABASE_ANON_KEY") {
            self.supabase_anon_key = Some(key);
        }
        if let Some(key) = lookup("SUPABASE_SERVICE_ROLE_KEY") {
            self.supabase_service_role_key = Some(key);
        }
        if let Some(id) = lookup("SKIN_AI_USER_ID") {
            self.user_id = Some(id);
        }
        self
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }

    pub fn get_api_key(&self) -> Result<String> {
        self.api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or(SkinAiError::MissingApiKey)
    }

    pub fn backend_settings(&self) -> Result<BackendSettings> {
        let url = self
            .supabase_url
            .clone()
            .ok_or(SkinAiError::MissingBackendConfig)?;
        let anon = self
            .supabase_anon_key
            .clone()
            .ok_or(SkinAiError::MissingBackendConfig)?;

        Ok(match self.supabase_service_role_key.clone() {
            Some(service) => BackendSettings {
                url,
                key: service,
                uses_service_role: true,
            },
            None => BackendSettings {
                url,
                key: anon,
                uses_service_role: false,
            },
        })
    }

    pub fn get_user_id(&self) -> Result<String> {
        self.user_id.clone().ok_or_else(|| {
            SkinAiError::Config(
                "ユーザーIDが設定されていません。`skin-ai config --set-user-id ID` で設定してください".into(),
            )
        })
    }

    pub fn set_api_key(&mut self, key: String) -> Result<()> {
        self.api_key = Some(key);
        self.save()
    }

    pub fn set_user_id(&mut self, id: String) -> Result<()> {
        self.user_id = Some(id);
        self.save()
    }
}
