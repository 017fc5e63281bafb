use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// 请求的输出种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SkinKind {
    /// 头部（`avatar` 为其别名）
    #[serde(alias = "avatar")]
    Head,
    /// 头部 + 帽子层
    Helm,
    /// 完整皮肤位图
    Skin,
    /// 完整皮肤位图（`player` 为其别名）
    #[serde(alias = "player")]
    Body,
}

impl SkinKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkinKind::Head => "head",
            SkinKind::Helm => "helm",
            SkinKind::Skin => "skin",
            SkinKind::Body => "body",
        }
    }
}

impl fmt::Display for SkinKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SkinKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "avatar" | "head" => Ok(SkinKind::Head),
            "helm" => Ok(SkinKind::Helm),
            "skin" => Ok(SkinKind::Skin),
            "body" | "player" => Ok(SkinKind::Body),
            other => Err(format!("未知的输出种类: {other}")),
        }
    }
}

/// 输出图片格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OutputFormat {
    #[default]
    Png,
    Jpeg,
}

impl OutputFormat {
    /// 宽松解析：允许前导 `.`，忽略大小写；未知或缺省一律回退 PNG。
    pub fn parse_lenient(raw: Option<&str>) -> Self {
        let Some(raw) = raw else {
            return OutputFormat::Png;
        };
        match raw.trim().trim_start_matches('.').to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => OutputFormat::Jpeg,
            _ => OutputFormat::Png,
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            OutputFormat::Png => "image/png",
            OutputFormat::Jpeg => "image/jpeg",
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            OutputFormat::Png => "png",
            OutputFormat::Jpeg => "jpg",
        }
    }
}

/// 输出尺寸边界
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeBounds {
    pub default: u32,
    pub min: u32,
    pub max: u32,
}

impl Default for SizeBounds {
    fn default() -> Self {
        Self {
            default: 180,
            min: 16,
            max: 1000,
        }
    }
}

impl SizeBounds {
    /// 解析并钳制尺寸：非数字或缺省使用默认值，数字一律钳制到 `[min, max]`，从不报错。
    ///
    /// 允许携带扩展名（`100.png`），只取 `.` 之前的部分。
    pub fn resolve(&self, raw: Option<&str>) -> u32 {
        let Some(s) = raw.map(|s| s.split('.').next().unwrap_or("").trim()) else {
            return self.default;
        };
        match s.parse::<i64>() {
            Ok(n) => n.clamp(i64::from(self.min), i64::from(self.max)) as u32,
            // 超出 i64 的纯数字仍按数值方向钳制
            Err(_) if is_digits(s) => self.max,
            Err(_) if s.strip_prefix('-').is_some_and(is_digits) => self.min,
            Err(_) => self.default,
        }
    }
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// 拆分 `name.ext` 形式的路径片段，返回（玩家名，可选扩展名）
pub fn split_extension(segment: &str) -> (&str, Option<&str>) {
    match segment.split_once('.') {
        Some((name, ext)) if !ext.is_empty() => (name, Some(ext)),
        Some((name, _)) => (name, None),
        None => (segment, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_is_always_clamped() {
        let b = SizeBounds::default();
        assert_eq!(b.resolve(Some("5")), 16);
        assert_eq!(b.resolve(Some("5000")), 1000);
        assert_eq!(b.resolve(Some("100")), 100);
        assert_eq!(b.resolve(Some("-20")), 16);
        assert_eq!(b.resolve(Some("99999999999999999999")), 1000);
        assert_eq!(b.resolve(Some("-99999999999999999999")), 16);
    }

    #[test]
    fn size_defaults_when_missing_or_garbage() {
        let b = SizeBounds::default();
        assert_eq!(b.resolve(None), 180);
        assert_eq!(b.resolve(Some("big")), 180);
        assert_eq!(b.resolve(Some("")), 180);
        assert_eq!(b.resolve(Some("64.png")), 64);
    }

    #[test]
    fn format_falls_back_to_png() {
        assert_eq!(OutputFormat::parse_lenient(None), OutputFormat::Png);
        assert_eq!(OutputFormat::parse_lenient(Some("gif")), OutputFormat::Png);
        assert_eq!(OutputFormat::parse_lenient(Some(".JPG")), OutputFormat::Jpeg);
        assert_eq!(OutputFormat::parse_lenient(Some("jpeg")), OutputFormat::Jpeg);
        assert_eq!(OutputFormat::Jpeg.content_type(), "image/jpeg");
    }

    #[test]
    fn kind_aliases() {
        assert_eq!("avatar".parse::<SkinKind>(), Ok(SkinKind::Head));
        assert_eq!("Player".parse::<SkinKind>(), Ok(SkinKind::Body));
        assert!("cube".parse::<SkinKind>().is_err());
    }

    #[test]
    fn split_extension_handles_plain_and_suffixed_segments() {
        assert_eq!(split_extension("Notch"), ("Notch", None));
        assert_eq!(split_extension("Notch.png"), ("Notch", Some("png")));
        assert_eq!(split_extension("Notch."), ("Notch", None));
    }
}
