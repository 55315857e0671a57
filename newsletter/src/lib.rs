pub mod composer;
pub mod render;
pub mod store;

pub use composer::{
    KeywordItem, NewsletterComposer, NewsletterContext, NewsletterEdition, PostItem, ProposalItem,
};
pub use render::HtmlRenderer;
pub use store::{EditionStore, StoredEdition};
