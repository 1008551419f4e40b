pub mod dom;
pub mod location;
pub mod theme;
pub mod title;
pub mod variables;

pub use dom::{DocumentRoot, History, MemoryDocument, MemoryHistory};
pub use location::LocationSync;
pub use theme::{ThemeChange, ThemeSync};
pub use title::TitleSync;
pub use variables::{VariableLinks, VariableResponder, VariableSource};
