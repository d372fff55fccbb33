//! Row conversion: mode resolution, value conversion, bindings and
//! synthetic keys.

mod binding;
mod decimal;
mod mode;
mod synth_key;
mod value;

pub use binding::{build_bindings, ColumnBinding};
pub use decimal::{decimal_text_path, DecimalType};
pub use mode::{resolve_mode, ConversionMode};
pub use synth_key::synth_key;
pub use value::{date_to_int, date_to_text, str_to_bool, ValueConverter};
