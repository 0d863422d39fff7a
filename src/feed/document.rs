use quick_xml::events::{BytesCData, BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::io::Cursor;
use thiserror::Error;

/// Namespace of the `g:` shopping fields.
pub const GOOGLE_NAMESPACE: &str = "http://base.google.com/ns/1.0";

/// Literal condition written for every item.
pub const CONDITION_NEW: &str = "New";

/// Errors for a feed file that cannot be turned back into a document.
#[derive(Debug, Error)]
pub enum MalformedFeedError {
    /// XML syntax error.
    #[error("XML parse error: {0}")]
    Xml(String),

    /// The document has no `rss/channel` container.
    #[error("Feed has no channel element")]
    MissingChannel,

    /// An `item` element carries no `g:id`.
    #[error("Feed item without g:id")]
    MissingItemId,

    /// CDATA content is not valid UTF-8.
    #[error("Feed contains invalid UTF-8")]
    InvalidUtf8,
}

/// Writing the document to its in-memory buffer failed.
#[derive(Debug, Error)]
#[error("Failed to serialize feed: {0}")]
pub struct SerializeError(String);

fn write_err(e: impl std::fmt::Display) -> SerializeError {
    SerializeError(e.to_string())
}

// ============================================================================
// Data Structures
// ============================================================================

/// Feed header shown by shopping-feed consumers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    pub title: String,
    pub link: String,
    pub description: String,
}

/// Stock state written to `g:availability`.
///
/// The mapper only produces the first two; any other value found in an
/// existing feed is carried through unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Availability {
    InStock,
    OutOfStock,
    Other(String),
}

impl Availability {
    pub fn as_str(&self) -> &str {
        match self {
            Self::InStock => "in stock",
            Self::OutOfStock => "out of stock",
            Self::Other(value) => value,
        }
    }

    fn parse(value: String) -> Self {
        match value.as_str() {
            "in stock" => Self::InStock,
            "out of stock" => Self::OutOfStock,
            _ => Self::Other(value),
        }
    }
}

/// One shopping-feed entry, keyed by catalog id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub id: String,
    pub title: String,
    pub description: String,
    pub link: String,
    pub product_type: String,
    /// Placeholder, written empty by the mapper.
    pub google_product_category: String,
    pub image_link: Option<String>,
    pub condition: String,
    pub availability: Availability,
    /// `<amount> <CURRENCY>`, e.g. `10.00 BRL`.
    pub price: String,
    pub brand: Option<String>,
    pub mpn: Option<String>,
}

/// Stable reference to an item inside a [`FeedDocument`].
///
/// Handles stay valid when other items are removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ItemHandle(u64);

/// A child element the document model does not interpret, such as
/// `g:gtin` or `lastBuildDate`.
///
/// Held as its raw event stream and written back unchanged, so a rewrite
/// keeps whatever other tools added to the feed. Whitespace between its
/// children is regenerated by the writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignElement {
    name: String,
    events: Vec<Event<'static>>,
}

impl ForeignElement {
    pub fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Debug, Clone)]
struct Entry {
    handle: ItemHandle,
    item: Item,
    foreign: Vec<ForeignElement>,
}

/// In-memory feed: a channel header and its items in file order.
#[derive(Debug, Clone)]
pub struct FeedDocument {
    channel: Channel,
    channel_foreign: Vec<ForeignElement>,
    items: Vec<Entry>,
    next_handle: u64,
}

impl PartialEq for FeedDocument {
    fn eq(&self, other: &Self) -> bool {
        self.channel == other.channel
            && self.channel_foreign == other.channel_foreign
            && self.items.len() == other.items.len()
            && self
                .items
                .iter()
                .zip(&other.items)
                .all(|(a, b)| a.item == b.item && a.foreign == b.foreign)
    }
}

impl FeedDocument {
    /// A document with a header and no items.
    pub fn new(channel: Channel) -> Self {
        Self {
            channel,
            channel_foreign: Vec::new(),
            items: Vec::new(),
            next_handle: 0,
        }
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    /// Uninterpreted channel children, in file order.
    pub fn channel_foreign_elements(&self) -> &[ForeignElement] {
        &self.channel_foreign
    }

    pub fn items(&self) -> impl Iterator<Item = &Item> {
        self.items.iter().map(|entry| &entry.item)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, handle: ItemHandle) -> Option<&Item> {
        self.entry(handle).map(|entry| &entry.item)
    }

    /// Uninterpreted children of the item behind `handle`.
    pub fn item_foreign_elements(&self, handle: ItemHandle) -> &[ForeignElement] {
        self.entry(handle)
            .map(|entry| entry.foreign.as_slice())
            .unwrap_or_default()
    }

    fn entry(&self, handle: ItemHandle) -> Option<&Entry> {
        self.items.iter().find(|entry| entry.handle == handle)
    }

    /// Handles of every item whose `g:id` equals `id`.
    pub fn find_items_by_id(&self, id: &str) -> Vec<ItemHandle> {
        self.items
            .iter()
            .filter(|entry| entry.item.id == id)
            .map(|entry| entry.handle)
            .collect()
    }

    /// Removes the item behind `handle`. A stale handle is a no-op.
    pub fn remove_item(&mut self, handle: ItemHandle) -> Option<Item> {
        let pos = self.items.iter().position(|entry| entry.handle == handle)?;
        Some(self.items.remove(pos).item)
    }

    /// Removes every item keyed by `id`, returning how many were dropped.
    pub fn remove_items_by_id(&mut self, id: &str) -> usize {
        let before = self.items.len();
        self.items.retain(|entry| entry.item.id != id);
        before - self.items.len()
    }

    /// Appends `item` at the end of the channel.
    pub fn append_item(&mut self, item: Item) -> ItemHandle {
        self.push_entry(item, Vec::new())
    }

    fn push_entry(&mut self, item: Item, foreign: Vec<ForeignElement>) -> ItemHandle {
        let handle = ItemHandle(self.next_handle);
        self.next_handle += 1;
        self.items.push(Entry {
            handle,
            item,
            foreign,
        });
        handle
    }
}

// ============================================================================
// Parsing
// ============================================================================

const CHANNEL_FIELDS: [&str; 4] = ["title", "link", "description", "item"];

#[derive(Default)]
struct ItemFields {
    id: Option<String>,
    title: Option<String>,
    description: Option<String>,
    link: Option<String>,
    product_type: Option<String>,
    google_product_category: Option<String>,
    image_link: Option<String>,
    condition: Option<String>,
    availability: Option<String>,
    price: Option<String>,
    brand: Option<String>,
    mpn: Option<String>,
    foreign: Vec<ForeignElement>,
}

impl ItemFields {
    const NAMES: [&'static str; 12] = [
        "g:id",
        "title",
        "g:description",
        "link",
        "g:product_type",
        "g:google_product_category",
        "g:image_link",
        "g:condition",
        "g:availability",
        "g:price",
        "g:brand",
        "g:mpn",
    ];

    fn set(&mut self, name: &str, value: String) {
        let slot = match name {
            "g:id" => &mut self.id,
            "title" => &mut self.title,
            "g:description" => &mut self.description,
            "link" => &mut self.link,
            "g:product_type" => &mut self.product_type,
            "g:google_product_category" => &mut self.google_product_category,
            "g:image_link" => &mut self.image_link,
            "g:condition" => &mut self.condition,
            "g:availability" => &mut self.availability,
            "g:price" => &mut self.price,
            "g:brand" => &mut self.brand,
            "g:mpn" => &mut self.mpn,
            _ => return,
        };
        *slot = Some(value);
    }

    fn finish(self) -> Result<(Item, Vec<ForeignElement>), MalformedFeedError> {
        let id = self
            .id
            .filter(|id| !id.is_empty())
            .ok_or(MalformedFeedError::MissingItemId)?;
        let item = Item {
            id,
            title: self.title.unwrap_or_default(),
            description: self.description.unwrap_or_default(),
            link: self.link.unwrap_or_default(),
            product_type: self.product_type.unwrap_or_default(),
            google_product_category: self.google_product_category.unwrap_or_default(),
            image_link: self.image_link.filter(|s| !s.is_empty()),
            condition: self
                .condition
                .unwrap_or_else(|| CONDITION_NEW.to_string()),
            availability: self
                .availability
                .map(Availability::parse)
                .unwrap_or(Availability::OutOfStock),
            price: self.price.unwrap_or_default(),
            brand: self.brand.filter(|s| !s.is_empty()),
            mpn: self.mpn.filter(|s| !s.is_empty()),
        };
        Ok((item, self.foreign))
    }
}

/// An uninterpreted element being read.
struct Capture {
    depth: usize,
    element: ForeignElement,
}

impl Capture {
    fn new(name: String, start: Event<'static>) -> Self {
        Self {
            depth: 1,
            element: ForeignElement {
                name,
                events: vec![start],
            },
        }
    }

    /// Records one event; true once the element's own end tag is seen.
    fn record(&mut self, event: Event<'static>) -> bool {
        match &event {
            Event::Start(_) => self.depth += 1,
            Event::End(_) => self.depth -= 1,
            Event::Text(t) if t.iter().all(u8::is_ascii_whitespace) => return false,
            _ => {}
        }
        self.element.events.push(event);
        self.depth == 0
    }
}

#[derive(Default)]
struct ParseState {
    path: Vec<String>,
    text: String,
    channel: Option<Channel>,
    channel_foreign: Vec<ForeignElement>,
    current: Option<ItemFields>,
    items: Vec<(Item, Vec<ForeignElement>)>,
    capture: Option<Capture>,
}

fn element_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.name().as_ref()).into_owned()
}

impl ParseState {
    /// True for a child of `channel` or `item` the model has no field for.
    fn is_foreign(&self, name: &str) -> bool {
        let names: Vec<&str> = self.path.iter().map(String::as_str).collect();
        match names.as_slice() {
            ["rss", "channel"] => !CHANNEL_FIELDS.contains(&name),
            ["rss", "channel", "item"] => !ItemFields::NAMES.contains(&name),
            _ => false,
        }
    }

    fn attach(&mut self, element: ForeignElement) {
        match self.current.as_mut() {
            Some(fields) => fields.foreign.push(element),
            None => self.channel_foreign.push(element),
        }
    }

    fn start(&mut self, e: BytesStart<'_>) {
        let name = element_name(&e);
        if self.is_foreign(&name) {
            self.capture = Some(Capture::new(name, Event::Start(e.into_owned())));
            return;
        }
        self.path.push(name);
        self.text.clear();
        self.open_element();
    }

    fn empty(&mut self, e: BytesStart<'_>) -> Result<(), MalformedFeedError> {
        let name = element_name(&e);
        if self.is_foreign(&name) {
            self.attach(ForeignElement {
                name,
                events: vec![Event::Empty(e.into_owned())],
            });
            return Ok(());
        }
        self.path.push(name);
        self.open_element();
        self.close_element(String::new())?;
        self.path.pop();
        Ok(())
    }

    fn end(&mut self) -> Result<(), MalformedFeedError> {
        let text = std::mem::take(&mut self.text);
        self.close_element(text)?;
        self.path.pop();
        Ok(())
    }

    fn open_element(&mut self) {
        let names: Vec<&str> = self.path.iter().map(String::as_str).collect();
        match names.as_slice() {
            ["rss", "channel"] => {
                self.channel.get_or_insert_with(|| Channel {
                    title: String::new(),
                    link: String::new(),
                    description: String::new(),
                });
            }
            ["rss", "channel", "item"] => self.current = Some(ItemFields::default()),
            _ => {}
        }
    }

    /// Applies the accumulated text of a just-closed element.
    ///
    /// `path` still includes the closed element as its last entry.
    fn close_element(&mut self, text: String) -> Result<(), MalformedFeedError> {
        let names: Vec<&str> = self.path.iter().map(String::as_str).collect();
        match names.as_slice() {
            ["rss", "channel", field] => {
                if let Some(channel) = self.channel.as_mut() {
                    match *field {
                        "title" => channel.title = text,
                        "link" => channel.link = text,
                        "description" => channel.description = text,
                        "item" => {
                            if let Some(fields) = self.current.take() {
                                self.items.push(fields.finish()?);
                            }
                        }
                        _ => {}
                    }
                }
            }
            ["rss", "channel", "item", field] => {
                if let Some(fields) = self.current.as_mut() {
                    fields.set(field, text);
                }
            }
            _ => {}
        }
        Ok(())
    }
}

/// Parses feed XML into a [`FeedDocument`].
///
/// Fields are matched by their literal qualified names (`g:id`, `title`,
/// ...) as written by [`serialize`]. Other children of `channel` and `item`
/// are kept as [`ForeignElement`]s. Field text is taken exactly as written,
/// surrounding whitespace included.
///
/// # Errors
///
/// [`MalformedFeedError`] if the bytes are not well-formed XML, there is no
/// `rss/channel`, or an item has no id.
pub fn parse(bytes: &[u8]) -> Result<FeedDocument, MalformedFeedError> {
    // SEC-002: quick-xml (0.37) never expands <!ENTITY> declarations; unknown
    // entity references fail in `unescape()` instead of being resolved.
    let mut reader = Reader::from_reader(bytes);

    let mut buf = Vec::new();
    let mut state = ParseState::default();

    loop {
        let event = match reader.read_event_into(&mut buf) {
            Ok(event) => event,
            Err(e) => {
                return Err(MalformedFeedError::Xml(format!(
                    "at position {}: {}",
                    reader.buffer_position(),
                    e
                )))
            }
        };

        if let Some(capture) = state.capture.as_mut() {
            if matches!(event, Event::Eof) {
                break;
            }
            if capture.record(event.into_owned()) {
                if let Some(done) = state.capture.take() {
                    state.attach(done.element);
                }
            }
            buf.clear();
            continue;
        }

        match event {
            Event::Start(e) => state.start(e),
            Event::Empty(e) => state.empty(e)?,
            Event::End(_) => state.end()?,
            Event::Text(t) => {
                let value = t
                    .unescape()
                    .map_err(|e| MalformedFeedError::Xml(e.to_string()))?;
                state.text.push_str(&value);
            }
            Event::CData(c) => {
                let value = std::str::from_utf8(&c).map_err(|_| MalformedFeedError::InvalidUtf8)?;
                state.text.push_str(value);
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if !state.path.is_empty() || state.capture.is_some() {
        return Err(MalformedFeedError::Xml(
            "unexpected end of document".to_string(),
        ));
    }

    let channel = state.channel.ok_or(MalformedFeedError::MissingChannel)?;
    let mut document = FeedDocument::new(channel);
    document.channel_foreign = state.channel_foreign;
    for (item, foreign) in state.items {
        document.push_entry(item, foreign);
    }
    Ok(document)
}

// ============================================================================
// Serialization
// ============================================================================

fn write_text<W: std::io::Write>(
    writer: &mut Writer<W>,
    name: &str,
    text: &str,
) -> Result<(), SerializeError> {
    writer
        .write_event(Event::Start(BytesStart::new(name)))
        .map_err(write_err)?;
    writer
        .write_event(Event::Text(BytesText::new(text)))
        .map_err(write_err)?;
    writer
        .write_event(Event::End(BytesEnd::new(name)))
        .map_err(write_err)
}

/// Writes `text` as CDATA, splitting the section around any `]]>`.
fn write_cdata<W: std::io::Write>(
    writer: &mut Writer<W>,
    name: &str,
    text: &str,
) -> Result<(), SerializeError> {
    writer
        .write_event(Event::Start(BytesStart::new(name)))
        .map_err(write_err)?;
    let mut rest = text;
    while let Some(pos) = rest.find("]]>") {
        writer
            .write_event(Event::CData(BytesCData::new(&rest[..pos + 2])))
            .map_err(write_err)?;
        rest = &rest[pos + 2..];
    }
    writer
        .write_event(Event::CData(BytesCData::new(rest)))
        .map_err(write_err)?;
    writer
        .write_event(Event::End(BytesEnd::new(name)))
        .map_err(write_err)
}

fn write_foreign<W: std::io::Write>(
    writer: &mut Writer<W>,
    elements: &[ForeignElement],
) -> Result<(), SerializeError> {
    for element in elements {
        for event in &element.events {
            writer.write_event(event.borrow()).map_err(write_err)?;
        }
    }
    Ok(())
}

fn write_item<W: std::io::Write>(writer: &mut Writer<W>, entry: &Entry) -> Result<(), SerializeError> {
    let item = &entry.item;
    writer
        .write_event(Event::Start(BytesStart::new("item")))
        .map_err(write_err)?;

    write_text(writer, "g:id", &item.id)?;
    write_cdata(writer, "title", &item.title)?;
    write_cdata(writer, "g:description", &item.description)?;
    write_cdata(writer, "link", &item.link)?;
    write_cdata(writer, "g:product_type", &item.product_type)?;
    if item.google_product_category.is_empty() {
        writer
            .write_event(Event::Empty(BytesStart::new("g:google_product_category")))
            .map_err(write_err)?;
    } else {
        write_text(writer, "g:google_product_category", &item.google_product_category)?;
    }
    write_cdata(writer, "g:image_link", item.image_link.as_deref().unwrap_or(""))?;
    write_cdata(writer, "g:condition", &item.condition)?;
    write_text(writer, "g:availability", item.availability.as_str())?;
    write_text(writer, "g:price", &item.price)?;
    if let Some(brand) = &item.brand {
        write_cdata(writer, "g:brand", brand)?;
    }
    if let Some(mpn) = &item.mpn {
        write_cdata(writer, "g:mpn", mpn)?;
    }
    write_foreign(writer, &entry.foreign)?;

    writer
        .write_event(Event::End(BytesEnd::new("item")))
        .map_err(write_err)
}

/// Serializes a document as indented RSS 2.0 with the `g:` namespace.
///
/// Output is deterministic: the same document always yields the same bytes.
pub fn serialize(document: &FeedDocument) -> Result<Vec<u8>, SerializeError> {
    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);

    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(write_err)?;

    let mut rss = BytesStart::new("rss");
    rss.push_attribute(("xmlns:g", GOOGLE_NAMESPACE));
    rss.push_attribute(("version", "2.0"));
    writer.write_event(Event::Start(rss)).map_err(write_err)?;
    writer
        .write_event(Event::Start(BytesStart::new("channel")))
        .map_err(write_err)?;

    let channel = document.channel();
    write_text(&mut writer, "title", &channel.title)?;
    write_text(&mut writer, "link", &channel.link)?;
    write_text(&mut writer, "description", &channel.description)?;
    write_foreign(&mut writer, &document.channel_foreign)?;

    for entry in &document.items {
        write_item(&mut writer, entry)?;
    }

    writer
        .write_event(Event::End(BytesEnd::new("channel")))
        .map_err(write_err)?;
    writer
        .write_event(Event::End(BytesEnd::new("rss")))
        .map_err(write_err)?;

    let mut bytes = writer.into_inner().into_inner();
    bytes.push(b'\n');
    Ok(bytes)
}
