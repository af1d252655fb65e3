pub mod extractor;
pub mod link;

pub use extractor::{
    DataValueReference, ExtractorRegistry, LinkListExtractor, RichTextExtractor, MULTI_URL_PICKER_ALIAS,
    RICH_TEXT_ALIAS,
};
pub use link::{from_editor, parse_links, to_storage, Link, LinkDisplay, LinkDto};
