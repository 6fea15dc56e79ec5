pub mod json;

pub use json::{DeckExport, export_deck, export_json_to_path, import_deck, import_json};
