use std::collections::HashSet;

use chrono::DateTime;
use quick_xml::events::{BytesStart, Event};
use quick_xml::{Error as XmlError, Reader};
use thiserror::Error;
use tracing::debug;

use super::{Episode, Podcast};

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("XML parsing error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("feed has no <channel> element")]
    MissingChannel,
}

#[derive(Debug, Default)]
struct RawItem {
    guid: Option<String>,
    title: Option<String>,
    enclosure_url: Option<String>,
    pub_date: Option<String>,
}

pub fn parse_feed(url: &str, xml: &str) -> Result<Podcast, FeedError> {
    let mut reader = Reader::from_str(xml);

    let mut path: Vec<String> = Vec::new();
    let mut text = String::new();
    let mut saw_channel = false;
    let mut channel_title = None;
    let mut current: Option<RawItem> = None;
    let mut raw_items = Vec::new();

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let name = tag_name(&e);
                match name.as_str() {
                    "channel" => saw_channel = true,
                    "item" if parent_is(&path, "channel") => current = Some(RawItem::default()),
                    "enclosure" => capture_enclosure(&e, &path, current.as_mut())?,
                    _ => {}
                }
                path.push(name);
                text.clear();
            }
            Event::Empty(e) => {
                if tag_name(&e) == "enclosure" {
                    capture_enclosure(&e, &path, current.as_mut())?;
                }
            }
            Event::Text(e) => {
                text.push_str(&e.decode().map_err(XmlError::Encoding)?);
            }
            Event::CData(e) => {
                text.push_str(&String::from_utf8_lossy(&e));
            }
            Event::GeneralRef(e) => {
                push_entity(&mut text, &String::from_utf8_lossy(&e));
            }
            Event::End(_) => {
                let Some(name) = path.pop() else {
                    continue;
                };
                let value = text.trim().to_string();
                text.clear();

                if name == "item" && parent_is(&path, "channel") {
                    if let Some(item) = current.take() {
                        raw_items.push(item);
                    }
                    continue;
                }
                if let Some(item) = current.as_mut()
                    && parent_is(&path, "item")
                {
                    match name.as_str() {
                        "guid" => item.guid = non_empty(value),
                        "title" => item.title = non_empty(value),
                        "pubDate" => item.pub_date = non_empty(value),
                        _ => {}
                    }
                } else if name == "title" && parent_is(&path, "channel") && channel_title.is_none()
                {
                    channel_title = non_empty(value);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !saw_channel {
        return Err(FeedError::MissingChannel);
    }

    let episodes = build_episodes(raw_items);
    debug!(%url, episodes = episodes.len(), "parsed feed");
    Ok(Podcast {
        url: url.to_string(),
        title: channel_title.unwrap_or_else(|| url.to_string()),
        episodes,
    })
}

fn build_episodes(raw_items: Vec<RawItem>) -> Vec<Episode> {
    let mut seen = HashSet::new();
    let mut episodes = Vec::new();
    for item in raw_items {
        let Some(enclosure_url) = item.enclosure_url else {
            continue;
        };
        let guid = item.guid.unwrap_or_else(|| enclosure_url.clone());
        if !seen.insert(guid.clone()) {
            continue;
        }
        let published = item
            .pub_date
            .as_deref()
            .and_then(|raw| DateTime::parse_from_rfc2822(raw).ok());
        episodes.push(Episode {
            title: item.title.unwrap_or_else(|| guid.clone()),
            guid,
            enclosure_url,
            published,
        });
    }

    if episodes.iter().all(|episode| episode.published.is_some()) {
        episodes.sort_by(|left, right| right.published.cmp(&left.published));
    }
    episodes
}

fn capture_enclosure(
    e: &BytesStart<'_>,
    path: &[String],
    current: Option<&mut RawItem>,
) -> Result<(), FeedError> {
    let Some(item) = current else {
        return Ok(());
    };
    if !parent_is(path, "item") || item.enclosure_url.is_some() {
        return Ok(());
    }
    if let Some(attr) = e.try_get_attribute("url").map_err(XmlError::from)? {
        let url = attr.unescape_value().map_err(XmlError::from)?;
        item.enclosure_url = non_empty(url.trim().to_string());
    }
    Ok(())
}

fn tag_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.name().as_ref()).to_string()
}

fn parent_is(path: &[String], name: &str) -> bool {
    path.last().is_some_and(|last| last == name)
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() { None } else { Some(value) }
}

fn push_entity(text: &mut String, entity: &str) {
    let resolved = match entity {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => entity.strip_prefix('#').and_then(|code| {
            let value = match code.strip_prefix('x').or_else(|| code.strip_prefix('X')) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => code.parse::<u32>().ok()?,
            };
            char::from_u32(value)
        }),
    };
    match resolved {
        Some(ch) => text.push(ch),
        None => {
            text.push('&');
            text.push_str(entity);
            text.push(';');
        }
    }
}
