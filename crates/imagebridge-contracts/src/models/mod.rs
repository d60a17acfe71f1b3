mod families;

pub use families::{EditProtocol, ModelFamily, ModelFamilyTable};
