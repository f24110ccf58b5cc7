//! Rewrites text elements of the simulator's XML project file

use quick_xml::events::{BytesEnd, BytesText, Event};
use quick_xml::{Reader, Writer};

/// Replace the text of the element at `path` (slash-separated, from the root element).
#[derive(Debug, Clone, Copy)]
pub struct ElementRewrite<'a> {
    pub path: &'a str,
    pub value: &'a str,
}

#[derive(Debug)]
pub struct RewriteOutcome {
    pub xml: String,
    /// Parallel to the requested rewrites: whether each element was present
    pub found: Vec<bool>,
}

/// Stream `xml` through, swapping the text content of every targeted element.
/// Everything else (declaration, comments, attributes, whitespace) is copied as is.
pub fn rewrite_elements(
    xml: &str,
    rewrites: &[ElementRewrite<'_>],
) -> Result<RewriteOutcome, quick_xml::Error> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);
    let mut writer = Writer::new(Vec::with_capacity(xml.len() + 256));

    let mut stack: Vec<String> = Vec::new();
    let mut found = vec![false; rewrites.len()];
    // (rewrite index, replacement already written)
    let mut active: Option<(usize, bool)> = None;

    let target = |path: &str| rewrites.iter().position(|r| r.path == path);

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                stack.push(String::from_utf8_lossy(e.name().as_ref()).into_owned());
                let hit = target(&stack.join("/"));
                writer.write_event(Event::Start(e))?;
                if let Some(i) = hit {
                    found[i] = true;
                    active = Some((i, false));
                }
            }
            Event::Empty(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                let path = if stack.is_empty() {
                    name.clone()
                } else {
                    format!("{}/{}", stack.join("/"), name)
                };
                match target(&path) {
                    Some(i) => {
                        found[i] = true;
                        writer.write_event(Event::Start(e))?;
                        writer.write_event(Event::Text(BytesText::new(rewrites[i].value)))?;
                        writer.write_event(Event::End(BytesEnd::new(name)))?;
                    }
                    None => writer.write_event(Event::Empty(e))?,
                }
            }
            Event::Text(t) => match active {
                Some((i, false)) => {
                    writer.write_event(Event::Text(BytesText::new(rewrites[i].value)))?;
                    active = Some((i, true));
                }
                Some((_, true)) => {}
                None => writer.write_event(Event::Text(t))?,
            },
            Event::CData(c) => match active {
                Some((i, false)) => {
                    writer.write_event(Event::Text(BytesText::new(rewrites[i].value)))?;
                    active = Some((i, true));
                }
                Some((_, true)) => {}
                None => writer.write_event(Event::CData(c))?,
            },
            Event::End(e) => {
                if let Some((i, written)) = active.take()
                    && !written
                {
                    writer.write_event(Event::Text(BytesText::new(rewrites[i].value)))?;
                }
                stack.pop();
                writer.write_event(Event::End(e))?;
            }
            Event::Eof => break,
            other => writer.write_event(other)?,
        }
    }

    Ok(RewriteOutcome {
        xml: String::from_utf8_lossy(&writer.into_inner()).into_owned(),
        found,
    })
}
