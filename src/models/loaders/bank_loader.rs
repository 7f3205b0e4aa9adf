//! 题库 XML 加载
//!
//! ```xml
//! <QuestionGenerators>
//!   <QuestionGenerator Used="y" Tags="Capitals;Capitals::Europe" Type="Match" Weight="1"
//!       QuestionText="What is the capital of __?" AdjacentWithin="-1"
//!       InfoPrefix="" InfoSuffix="">
//!     <Answer Text="France" Value="Paris"/>
//!   </QuestionGenerator>
//! </QuestionGenerators>
//! ```
//!
//! 单个生成器的属性格式错误只跳过该生成器；XML 本身损坏则整个题库加载失败。

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::path::Path;
use tokio::fs;
use tracing::{debug, warn};

use crate::error::{AppError, AppResult, SourceError};
use crate::services::question_generator::{GeneratorBuilder, GeneratorVariant, QuestionGenerator};

const GENERATOR_TAG: &[u8] = b"QuestionGenerator";
const ANSWER_TAG: &[u8] = b"Answer";

/// 正在解析的生成器
enum Pending {
    Building(GeneratorBuilder),
    Skipped,
}

/// 解析题库 XML
pub fn parse_question_bank(xml: &str, database_url: &str) -> AppResult<Vec<QuestionGenerator>> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut buf = Vec::new();
    let mut generators = Vec::new();
    let mut current: Option<Pending> = None;
    let mut seen_elements = 0usize;

    loop {
        match reader.read_event_into(&mut buf) {
            Err(e) => {
                return Err(AppError::Source(SourceError::MalformedXml {
                    position: reader.buffer_position(),
                    message: e.to_string(),
                }))
            }
            Ok(Event::Start(e)) if e.name().as_ref() == GENERATOR_TAG => {
                seen_elements += 1;
                current = Some(start_generator(&e, database_url)?);
            }
            Ok(Event::Empty(e)) if e.name().as_ref() == GENERATOR_TAG => {
                // 没有 Answer 子元素，必然为空生成器
                seen_elements += 1;
                debug!("跳过没有数据的生成器");
            }
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) if e.name().as_ref() == ANSWER_TAG => {
                if let Some(Pending::Building(builder)) = current.as_mut() {
                    let text = attribute(&e, b"Text")?.unwrap_or_default();
                    let value = attribute(&e, b"Value")?.unwrap_or_default();
                    builder.add_entry(&text, &value);
                }
            }
            Ok(Event::End(e)) if e.name().as_ref() == GENERATOR_TAG => {
                if let Some(Pending::Building(builder)) = current.take() {
                    if let Some(generator) = builder.build() {
                        generators.push(generator);
                    }
                }
            }
            Ok(Event::Eof) => break,
            _ => {}
        }
        buf.clear();
    }

    if current.is_some() {
        return Err(AppError::Source(SourceError::MalformedXml {
            position: reader.buffer_position(),
            message: "QuestionGenerator 元素未闭合".to_string(),
        }));
    }
    if seen_elements == 0 {
        return Err(AppError::Source(SourceError::NoGenerators));
    }

    debug!("解析题库 {}: {} 个生成器", database_url, generators.len());
    Ok(generators)
}

/// 读取题库文件
pub async fn load_question_bank(path: &Path, database_url: &str) -> AppResult<Vec<QuestionGenerator>> {
    let content = fs::read_to_string(path)
        .await
        .map_err(|e| AppError::file_read_failed(path.display().to_string(), e))?;
    parse_question_bank(&content, database_url)
}

fn start_generator(e: &BytesStart<'_>, database_url: &str) -> AppResult<Pending> {
    if attribute(e, b"Used")?.as_deref() != Some("y") {
        return Ok(Pending::Skipped);
    }

    let template = attribute(e, b"QuestionText")?.unwrap_or_default();

    let variant = match attribute(e, b"Type")?.map(|t| t.parse::<GeneratorVariant>()) {
        Some(Ok(variant)) => variant,
        Some(Err(reason)) => {
            warn!("跳过生成器 '{}': {}", template, reason);
            return Ok(Pending::Skipped);
        }
        None => {
            warn!("跳过生成器 '{}': 缺少 Type", template);
            return Ok(Pending::Skipped);
        }
    };

    let weight = match attribute(e, b"Weight")?.map(|w| w.trim().parse::<f32>()) {
        Some(Ok(weight)) if weight > 0.0 && weight <= 1.0 => weight,
        other => {
            warn!("跳过生成器 '{}': Weight 不合法 ({:?})", template, other);
            return Ok(Pending::Skipped);
        }
    };

    let adjacent_within = match attribute(e, b"AdjacentWithin")? {
        None => 0,
        Some(raw) if raw.trim().is_empty() => 0,
        Some(raw) => match raw.trim().parse::<i64>() {
            Ok(within) => within.max(0) as usize,
            Err(_) => {
                warn!("跳过生成器 '{}': AdjacentWithin 不合法 ({})", template, raw);
                return Ok(Pending::Skipped);
            }
        },
    };

    let tags = attribute(e, b"Tags")?.unwrap_or_default();

    let builder = GeneratorBuilder::new(variant, template)
        .tags(tags.split(';').map(str::to_string))
        .weight(weight)
        .adjacent_within(adjacent_within)
        .prefix(attribute(e, b"InfoPrefix")?.unwrap_or_default())
        .suffix(attribute(e, b"InfoSuffix")?.unwrap_or_default())
        .database_url(database_url);

    Ok(Pending::Building(builder))
}

fn attribute(e: &BytesStart<'_>, name: &[u8]) -> AppResult<Option<String>> {
    for attr in e.attributes() {
        let attr = attr.map_err(|err| {
            AppError::Source(SourceError::MalformedXml {
                position: 0,
                message: err.to_string(),
            })
        })?;
        if attr.key.as_ref() == name {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}
