use quick_xml::escape::unescape;
use quick_xml::events::Event;
use quick_xml::Reader;
use thiserror::Error;

/// Maximum allowed element nesting depth.
/// Prevents unbounded memory growth from maliciously nested payloads.
const MAX_ELEMENT_DEPTH: usize = 64;

/// Number of characters of the offending payload kept for diagnostics.
const SNIPPET_CHARS: usize = 120;

/// Errors from turning raw response bytes into a [`Document`].
///
/// An empty body is deliberately distinct from a malformed one: an empty
/// response usually means a misconfigured relay returned nothing, while a
/// malformed response means the source served something that isn't XML.
#[derive(Debug, Error)]
pub enum DocumentError {
    /// The response body was empty or whitespace-only.
    #[error("empty response body")]
    Empty,
    /// The response body was not well-formed XML.
    #[error("malformed document: {message}")]
    Malformed {
        message: String,
        /// Leading slice of the payload, for log diagnosis.
        snippet: String,
    },
}

/// One XML element: name, attributes, child elements, accumulated text.
///
/// Attributes live in their own table and can never collide with child
/// element names: `<title lang="en"><lang>x</lang></title>` keeps both.
/// Repeated child names are a sequence by construction: [`Element::children`]
/// on a document with a single `<item>` returns a one-element list, so the
/// "single element collapses to a bare object" failure mode of map-based
/// XML representations cannot occur here.
#[derive(Debug, Clone, Default)]
pub struct Element {
    name: String,
    attributes: Vec<(String, String)>,
    children: Vec<Element>,
    text: String,
}

impl Element {
    /// Element name as written, prefix included (`media:content`).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attribute value by name, if present.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Trimmed text content of this element (not descendants), if any.
    pub fn text(&self) -> Option<&str> {
        if self.text.is_empty() {
            None
        } else {
            Some(&self.text)
        }
    }

    /// First child element with the given name.
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    /// All child elements with the given name, in document order.
    pub fn children(&self, name: &str) -> Vec<&Element> {
        self.children.iter().filter(|c| c.name == name).collect()
    }
}

/// A parsed XML document: a tree of [`Element`]s under a single root.
///
/// This is the transient, format-agnostic shape every feed dialect is read
/// into; it lives only until normalization and is then discarded.
#[derive(Debug, Clone)]
pub struct Document {
    root: Element,
}

impl Document {
    /// Root element of the document.
    pub fn root(&self) -> &Element {
        &self.root
    }

    /// Parses raw response bytes into a document tree.
    ///
    /// Invalid UTF-8 is replaced rather than rejected; real-world feeds
    /// routinely declare one encoding and serve another, and a lossy char
    /// in a description is better than losing the whole source.
    ///
    /// # Errors
    ///
    /// - [`DocumentError::Empty`] if the body is empty or whitespace-only
    /// - [`DocumentError::Malformed`] for XML syntax errors, unclosed
    ///   elements, excessive nesting, or a body with no root element
    pub fn parse(bytes: &[u8]) -> Result<Self, DocumentError> {
        let content = String::from_utf8_lossy(bytes);
        if content.trim().is_empty() {
            return Err(DocumentError::Empty);
        }
        parse_tree(&content)
    }
}

fn malformed(content: &str, message: impl Into<String>) -> DocumentError {
    let trimmed = content.trim_start();
    let snippet: String = trimmed.chars().take(SNIPPET_CHARS).collect();
    DocumentError::Malformed {
        message: message.into(),
        snippet,
    }
}

fn parse_tree(content: &str) -> Result<Document, DocumentError> {
    // Entity declarations from DOCTYPE are never expanded by quick-xml
    // (0.37); only the 5 XML builtins resolve. Unknown entities stay
    // literal via the unescape fallback below, and the fixed entity set
    // the normalizer decodes is handled downstream in summary cleaning.
    let mut reader = Reader::from_reader(content.as_bytes());
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                if stack.len() >= MAX_ELEMENT_DEPTH {
                    return Err(malformed(
                        content,
                        format!("element nesting exceeds {} levels", MAX_ELEMENT_DEPTH),
                    ));
                }
                let element = open_element(&e, &reader);
                stack.push(element);
            }
            Ok(Event::Empty(e)) => {
                let element = open_element(&e, &reader);
                match stack.last_mut() {
                    Some(parent) => parent.children.push(element),
                    None if root.is_none() => root = Some(element),
                    None => {} // trailing junk after the root; ignore
                }
            }
            Ok(Event::End(_)) => {
                // quick-xml has already verified the end name matches
                let Some(mut closed) = stack.pop() else {
                    return Err(malformed(content, "unexpected closing tag"));
                };
                closed.text = closed.text.trim().to_string();
                match stack.last_mut() {
                    Some(parent) => parent.children.push(closed),
                    None if root.is_none() => root = Some(closed),
                    None => {}
                }
            }
            Ok(Event::Text(e)) => {
                if let Some(current) = stack.last_mut() {
                    let raw = reader
                        .decoder()
                        .decode(e.as_ref())
                        .map_err(|err| malformed(content, err.to_string()))?;
                    // Resolve the XML builtins when well-formed; keep the
                    // raw text when the payload uses entities XML doesn't
                    // know (&nbsp; and friends are the normalizer's job).
                    match unescape(&raw) {
                        Ok(unescaped) => current.text.push_str(&unescaped),
                        Err(_) => current.text.push_str(&raw),
                    }
                }
            }
            Ok(Event::CData(e)) => {
                if let Some(current) = stack.last_mut() {
                    let raw = reader
                        .decoder()
                        .decode(e.as_ref())
                        .map_err(|err| malformed(content, err.to_string()))?;
                    current.text.push_str(raw.trim());
                }
            }
            Ok(Event::Eof) => {
                if !stack.is_empty() {
                    return Err(malformed(content, "unexpected end of document"));
                }
                break;
            }
            Err(e) => return Err(malformed(content, e.to_string())),
            _ => {} // declaration, comments, processing instructions, doctype
        }
        buf.clear();
    }

    match root {
        Some(root) => Ok(Document { root }),
        None => Err(malformed(content, "no root element")),
    }
}

/// Builds an element from a start/empty tag, decoding its attributes.
/// A malformed attribute is skipped with a warning rather than failing the
/// whole document; feeds in the wild carry plenty of sloppy markup.
fn open_element(
    e: &quick_xml::events::BytesStart<'_>,
    reader: &Reader<&[u8]>,
) -> Element {
    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let decoder = reader.decoder();

    let mut attributes = Vec::new();
    for attr_result in e.attributes() {
        let attr = match attr_result {
            Ok(attr) => attr,
            Err(err) => {
                tracing::warn!(element = %name, error = %err, "Skipping malformed attribute");
                continue;
            }
        };
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        match attr.decode_and_unescape_value(decoder) {
            Ok(value) => attributes.push((key, value.into_owned())),
            Err(err) => {
                tracing::warn!(element = %name, attribute = %key, error = %err, "Skipping undecodable attribute");
            }
        }
    }

    Element {
        name,
        attributes,
        children: Vec::new(),
        text: String::new(),
    }
}
