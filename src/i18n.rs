//! Bilingual UI strings (EN/ZH) and the persisted language preference.
//!
//! Labels are always recomputed from the current [`ConnectionState`] and the
//! active table; state is never inferred from displayed text.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::conn::ConnectionState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Lang {
    #[default]
    En,
    Zh,
}

impl Lang {
    pub fn token(self) -> &'static str {
        match self {
            Lang::En => "en",
            Lang::Zh => "zh",
        }
    }

    pub fn from_token(token: &str) -> Option<Lang> {
        match token.trim().to_ascii_lowercase().as_str() {
            "en" => Some(Lang::En),
            "zh" => Some(Lang::Zh),
            _ => None,
        }
    }

    pub fn toggled(self) -> Lang {
        match self {
            Lang::En => Lang::Zh,
            Lang::Zh => Lang::En,
        }
    }
}

pub struct Strings {
    pub title: &'static str,
    pub status_connected: &'static str,
    pub status_connecting: &'static str,
    pub status_http_fallback: &'static str,
    pub placeholder: &'static str,
    pub send_failed: &'static str,
    pub typing: &'static str,
    pub role_user: &'static str,
    pub role_assistant: &'static str,
    pub role_error: &'static str,
    pub help: &'static str,
}

impl Strings {
    /// Status label derived directly from the connection state.
    pub fn status(&self, state: ConnectionState) -> &'static str {
        match state {
            ConnectionState::Connected => self.status_connected,
            ConnectionState::Connecting => self.status_connecting,
            ConnectionState::Disconnected => self.status_http_fallback,
        }
    }
}

static EN: Strings = Strings {
    title: "nibot chat",
    status_connected: "Connected",
    status_connecting: "Connecting...",
    status_http_fallback: "HTTP mode",
    placeholder: "Type a message and press Enter to send. Ctrl+J for a new line.",
    send_failed: "Failed to send message, check your network connection",
    typing: "typing",
    role_user: "You",
    role_assistant: "Assistant",
    role_error: "Error",
    help: "Enter send · Up/Down history · Esc clear · Ctrl+L language · Ctrl+Q quit",
};

static ZH: Strings = Strings {
    title: "nibot 聊天",
    status_connected: "已连接",
    status_connecting: "连接中...",
    status_http_fallback: "HTTP模式",
    placeholder: "输入消息，按回车发送。Ctrl+J 换行。",
    send_failed: "发送消息失败，请检查网络连接",
    typing: "正在输入",
    role_user: "你",
    role_assistant: "助手",
    role_error: "错误",
    help: "回车发送 · 上下键历史 · Esc 清空 · Ctrl+L 切换语言 · Ctrl+Q 退出",
};

pub fn strings(lang: Lang) -> &'static Strings {
    match lang {
        Lang::En => &EN,
        Lang::Zh => &ZH,
    }
}

/// Read a previously saved preference; anything unreadable means "no
/// preference" and the caller falls back to the default.
pub fn load_preference(path: &Path) -> Option<Lang> {
    let token = fs::read_to_string(path).ok()?;
    Lang::from_token(&token)
}

/// Active language plus optional cross-session persistence.
pub struct Locale {
    current: Lang,
    store: Option<PathBuf>,
}

impl Locale {
    pub fn new(initial: Lang, store: Option<PathBuf>) -> Self {
        Self {
            current: initial,
            store,
        }
    }

    /// Load the saved preference from `path`, defaulting to English.
    pub fn load(path: PathBuf) -> Self {
        let current = load_preference(&path).unwrap_or_default();
        Self {
            current,
            store: Some(path),
        }
    }

    pub fn current(&self) -> Lang {
        self.current
    }

    pub fn strings(&self) -> &'static Strings {
        strings(self.current)
    }

    /// Switch the active language. No-op (returns false) when `lang` is
    /// already current; otherwise persists the choice and returns true.
    pub fn switch(&mut self, lang: Lang) -> bool {
        if lang == self.current {
            return false;
        }
        self.current = lang;
        if let Some(path) = &self.store {
            if let Some(parent) = path.parent() {
                let _ = fs::create_dir_all(parent);
            }
            if let Err(err) = fs::write(path, lang.token()) {
                warn!(path = %path.display(), error = %err, "failed to save language preference");
            }
        }
        true
    }
}
