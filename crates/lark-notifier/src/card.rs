//! 消息卡片渲染
//!
//! 将"级别 + 标题 + 正文"渲染为固定布局的交互卡片：正文为 markdown 块，
//! 页脚带时钟图标和发送时间，标题栏颜色由级别决定。
//!
//! 模板在构造时解析一次，之后只读，可通过 `Arc` 在多个渲染器间共享。

use std::sync::Arc;

use regex::Regex;
use serde_json::Value;

use crate::error::LarkError;
use crate::message::Level;

/// 卡片时间戳格式
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// 默认卡片布局
const DEFAULT_CARD_TEMPLATE: &str = r#"{
    "config": {},
    "i18n_elements": {
        "zh_cn": [
            {
                "tag": "markdown",
                "content": "{{content}}",
                "text_align": "left",
                "text_size": "normal"
            },
            {
                "tag": "column_set",
                "flex_mode": "none",
                "background_style": "default",
                "horizontal_spacing": "8px",
                "horizontal_align": "left",
                "columns": [
                    {
                        "tag": "column",
                        "width": "weighted",
                        "vertical_align": "top",
                        "vertical_spacing": "8px",
                        "background_style": "default",
                        "elements": [
                            { "tag": "hr" },
                            {
                                "tag": "column_set",
                                "flex_mode": "none",
                                "horizontal_spacing": "default",
                                "background_style": "default",
                                "columns": [
                                    {
                                        "tag": "column",
                                        "elements": [
                                            {
                                                "tag": "div",
                                                "text": {
                                                    "tag": "plain_text",
                                                    "content": "{{time}}",
                                                    "text_size": "notation",
                                                    "text_align": "left",
                                                    "text_color": "grey"
                                                },
                                                "icon": {
                                                    "tag": "standard_icon",
                                                    "token": "time_outlined",
                                                    "color": "grey"
                                                }
                                            }
                                        ],
                                        "width": "weighted",
                                        "weight": 1
                                    }
                                ]
                            }
                        ],
                        "weight": 1,
                        "padding": "0px 0px 0px 0px"
                    }
                ],
                "margin": "16px 0px 0px 0px"
            }
        ]
    },
    "i18n_header": {
        "zh_cn": {
            "title": {
                "tag": "plain_text",
                "content": "{{title}}"
            },
            "subtitle": {
                "tag": "plain_text",
                "content": ""
            },
            "template": "{{level_color}}"
        }
    }
}"#;

/// 级别对应的标题栏颜色，未知级别（包括空字符串）为蓝色
pub fn level_color(level: &str) -> &'static str {
    match level {
        "success" => "green",
        "error" => "red",
        "warn" => "yellow",
        _ => "blue",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Content,
    Time,
    Title,
    LevelColor,
}

impl Field {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "content" => Some(Self::Content),
            "time" => Some(Self::Time),
            "title" => Some(Self::Title),
            "level_color" => Some(Self::LevelColor),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Placeholder(Field),
}

/// 渲染时填入模板的字段
#[derive(Debug, Clone)]
pub struct CardFields<'a> {
    pub content: &'a str,
    pub time: &'a str,
    pub title: &'a str,
    pub level_color: &'a str,
}

impl CardFields<'_> {
    fn get(&self, field: Field) -> &str {
        match field {
            Field::Content => self.content,
            Field::Time => self.time,
            Field::Title => self.title,
            Field::LevelColor => self.level_color,
        }
    }
}

/// 已解析的卡片模板
///
/// 模板是带 `{{name}}` 占位符的 JSON 文本，占位符只能出现在 JSON 字符串内部，
/// 填入的值会按 JSON 字符串规则转义。支持的占位符：
/// `content`、`time`、`title`、`level_color`。
#[derive(Debug, Clone)]
pub struct CardTemplate {
    segments: Vec<Segment>,
}

impl CardTemplate {
    /// 解析模板，遇到未知占位符时返回 `TemplateRender`
    pub fn parse(source: &str) -> Result<Self, LarkError> {
        let placeholder = Regex::new(r"\{\{\s*([a-z_]+)\s*\}\}")
            .map_err(|e| LarkError::TemplateRender(e.to_string()))?;

        let mut segments = Vec::new();
        let mut last = 0;
        for caps in placeholder.captures_iter(source) {
            let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let field = Field::parse(name.as_str()).ok_or_else(|| {
                LarkError::TemplateRender(format!("未知的模板占位符: {}", name.as_str()))
            })?;

            if whole.start() > last {
                segments.push(Segment::Literal(source[last..whole.start()].to_string()));
            }
            segments.push(Segment::Placeholder(field));
            last = whole.end();
        }
        if last < source.len() {
            segments.push(Segment::Literal(source[last..].to_string()));
        }

        Ok(Self { segments })
    }

    /// 内置的默认卡片布局
    pub fn default_card() -> Result<Self, LarkError> {
        Self::parse(DEFAULT_CARD_TEMPLATE)
    }

    /// 填充占位符并解析为 JSON
    pub fn render(&self, fields: &CardFields<'_>) -> Result<Value, LarkError> {
        let mut output = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => output.push_str(text),
                Segment::Placeholder(field) => output.push_str(&escape_json(fields.get(*field))?),
            }
        }

        serde_json::from_str(&output)
            .map_err(|e| LarkError::TemplateRender(format!("渲染结果不是合法的 JSON: {e}")))
    }
}

/// 按 JSON 字符串规则转义，不含首尾引号
fn escape_json(value: &str) -> Result<String, LarkError> {
    let quoted =
        serde_json::to_string(value).map_err(|e| LarkError::TemplateRender(e.to_string()))?;
    Ok(quoted[1..quoted.len() - 1].to_string())
}

/// 卡片渲染器
#[derive(Debug, Clone)]
pub struct CardRenderer {
    template: Arc<CardTemplate>,
}

impl CardRenderer {
    pub fn new(template: Arc<CardTemplate>) -> Self {
        Self { template }
    }

    /// 使用默认卡片布局
    pub fn with_default_template() -> Result<Self, LarkError> {
        Ok(Self::new(Arc::new(CardTemplate::default_card()?)))
    }

    /// 以当前本地时间渲染卡片
    pub fn render(&self, level: Option<Level>, title: &str, content: &str) -> Result<Value, LarkError> {
        let now = chrono::Local::now().format(TIME_FORMAT).to_string();
        self.render_at(level, title, content, &now)
    }

    /// 以指定时间渲染卡片
    pub fn render_at(
        &self,
        level: Option<Level>,
        title: &str,
        content: &str,
        time: &str,
    ) -> Result<Value, LarkError> {
        let level = level.map(|l| l.as_str()).unwrap_or_default();
        self.template.render(&CardFields {
            content,
            time,
            title,
            level_color: level_color(level),
        })
    }
}
