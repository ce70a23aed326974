//! Type model: value type descriptors, XML names and type maps

mod data_type;
mod map;
mod name;

pub use data_type::DataType;
pub use map::TypeMap;
pub use name::{XmlName, XmlType};
