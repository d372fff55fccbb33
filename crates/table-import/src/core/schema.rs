//! Schema and metadata types for source tables and target store tables.
//!
//! Source side types describe what a driver reports (wire types, blob
//! columns, the "select all" statement). Target side types describe the
//! destination table the rows are written to.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Reserved target field name carrying a synthesized surrogate key.
pub const SYNTH_KEY_FIELD: &str = "_synth_key";

/// Name of the id field of an auxiliary blob table.
pub const BLOB_ID_FIELD: &str = "id";

/// Name of the payload field of an auxiliary blob table.
pub const BLOB_VALUE_FIELD: &str = "val";

/// Wire type reported by a source driver for a result column.
///
/// Variants mirror the standard SQL type codes (`java.sql.Types` numbering)
/// so drivers can map their metadata with [`WireType::from_code`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireType {
    Bit,
    TinyInt,
    SmallInt,
    Integer,
    BigInt,
    Float,
    Real,
    Double,
    Numeric,
    Decimal,
    Char,
    VarChar,
    LongVarChar,
    NChar,
    NVarChar,
    LongNVarChar,
    Date,
    Time,
    Timestamp,
    TimeWithTimezone,
    TimestampWithTimezone,
    Binary,
    VarBinary,
    LongVarBinary,
    Boolean,
    Blob,
    Clob,
    NClob,
    SqlXml,
    Array,
    Struct,
    RowId,
    Null,
    /// Any code without a dedicated variant.
    Other(i32),
}

impl WireType {
    /// Map a standard SQL type code to a wire type.
    pub fn from_code(code: i32) -> Self {
        match code {
            -7 => WireType::Bit,
            -6 => WireType::TinyInt,
            5 => WireType::SmallInt,
            4 => WireType::Integer,
            -5 => WireType::BigInt,
            6 => WireType::Float,
            7 => WireType::Real,
            8 => WireType::Double,
            2 => WireType::Numeric,
            3 => WireType::Decimal,
            1 => WireType::Char,
            12 => WireType::VarChar,
            -1 => WireType::LongVarChar,
            -15 => WireType::NChar,
            -9 => WireType::NVarChar,
            -16 => WireType::LongNVarChar,
            91 => WireType::Date,
            92 => WireType::Time,
            93 => WireType::Timestamp,
            2013 => WireType::TimeWithTimezone,
            2014 => WireType::TimestampWithTimezone,
            -2 => WireType::Binary,
            -3 => WireType::VarBinary,
            -4 => WireType::LongVarBinary,
            16 => WireType::Boolean,
            2004 => WireType::Blob,
            2005 => WireType::Clob,
            2011 => WireType::NClob,
            2009 => WireType::SqlXml,
            2003 => WireType::Array,
            2002 => WireType::Struct,
            -8 => WireType::RowId,
            0 => WireType::Null,
            other => WireType::Other(other),
        }
    }

    /// Standard SQL type code of this wire type.
    pub fn code(&self) -> i32 {
        match self {
            WireType::Bit => -7,
            WireType::TinyInt => -6,
            WireType::SmallInt => 5,
            WireType::Integer => 4,
            WireType::BigInt => -5,
            WireType::Float => 6,
            WireType::Real => 7,
            WireType::Double => 8,
            WireType::Numeric => 2,
            WireType::Decimal => 3,
            WireType::Char => 1,
            WireType::VarChar => 12,
            WireType::LongVarChar => -1,
            WireType::NChar => -15,
            WireType::NVarChar => -9,
            WireType::LongNVarChar => -16,
            WireType::Date => 91,
            WireType::Time => 92,
            WireType::Timestamp => 93,
            WireType::TimeWithTimezone => 2013,
            WireType::TimestampWithTimezone => 2014,
            WireType::Binary => -2,
            WireType::VarBinary => -3,
            WireType::LongVarBinary => -4,
            WireType::Boolean => 16,
            WireType::Blob => 2004,
            WireType::Clob => 2005,
            WireType::NClob => 2011,
            WireType::SqlXml => 2009,
            WireType::Array => 2003,
            WireType::Struct => 2002,
            WireType::RowId => -8,
            WireType::Null => 0,
            WireType::Other(code) => *code,
        }
    }

    /// Large-object wire types. Their values are externalized into auxiliary
    /// tables and never take part in synthetic key derivation.
    pub fn is_blob(&self) -> bool {
        matches!(
            self,
            WireType::Blob
                | WireType::Clob
                | WireType::NClob
                | WireType::LongVarBinary
                | WireType::LongVarChar
                | WireType::LongNVarChar
        )
    }
}

impl fmt::Display for WireType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireType::Other(code) => write!(f, "OTHER({})", code),
            other => write!(f, "{:?}", other),
        }
    }
}

/// Primitive kind of a target store column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TargetKind {
    Bool,
    Int8,
    Uint8,
    Int16,
    Uint16,
    Int32,
    Uint32,
    Int64,
    Uint64,
    Float,
    Double,
    Decimal,
    Date,
    Datetime,
    Timestamp,
    Interval,
    Text,
    Bytes,
    Json,
    Uuid,
}

/// Target column type: a primitive kind, possibly optional.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetType {
    pub kind: TargetKind,
    #[serde(default)]
    pub optional: bool,
}

impl TargetType {
    pub fn required(kind: TargetKind) -> Self {
        Self {
            kind,
            optional: false,
        }
    }

    pub fn optional(kind: TargetKind) -> Self {
        Self {
            kind,
            optional: true,
        }
    }
}

impl fmt::Display for TargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.optional {
            write!(f, "Optional<{:?}>", self.kind)
        } else {
            write!(f, "{:?}", self.kind)
        }
    }
}

/// One column of a target table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetField {
    pub name: String,
    pub field_type: TargetType,
}

impl TargetField {
    pub fn new(name: impl Into<String>, field_type: TargetType) -> Self {
        Self {
            name: name.into(),
            field_type,
        }
    }
}

/// Target table definition. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetSchema {
    /// Table path relative to the store's database root.
    pub full_name: String,
    pub fields: Vec<TargetField>,
    synth_key_pos: Option<usize>,
}

impl TargetSchema {
    pub fn new(full_name: impl Into<String>, fields: Vec<TargetField>) -> Self {
        let synth_key_pos = fields.iter().position(|f| f.name == SYNTH_KEY_FIELD);
        Self {
            full_name: full_name.into(),
            fields,
            synth_key_pos,
        }
    }

    /// Auxiliary table holding externalized values of one blob column.
    pub fn blob_table(full_name: impl Into<String>) -> Self {
        Self::new(
            full_name,
            vec![
                TargetField::new(BLOB_ID_FIELD, TargetType::required(TargetKind::Int64)),
                TargetField::new(BLOB_VALUE_FIELD, TargetType::optional(TargetKind::Bytes)),
            ],
        )
    }

    /// Position of the synthetic key field, if the table declares one.
    pub fn synth_key_pos(&self) -> Option<usize> {
        self.synth_key_pos
    }

    pub fn field_names(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name.clone()).collect()
    }
}

/// How the source driver exposes a large-object column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlobKind {
    /// The field is read directly as a binary stream.
    #[default]
    Stream,
    /// The field is read as a LOB locator whose stream is opened separately.
    Object,
}

/// A column as described by source metadata discovery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceColumn {
    pub name: String,
    pub wire_type: WireType,
    #[serde(default)]
    pub is_blob: bool,
    #[serde(default)]
    pub blob_kind: BlobKind,
}

impl SourceColumn {
    pub fn new(name: impl Into<String>, wire_type: WireType) -> Self {
        Self {
            name: name.into(),
            is_blob: wire_type.is_blob(),
            wire_type,
            blob_kind: BlobKind::default(),
        }
    }

    pub fn with_blob_kind(mut self, kind: BlobKind) -> Self {
        self.blob_kind = kind;
        self
    }
}

/// Resolved metadata of a source table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceMetadata {
    pub columns: Vec<SourceColumn>,
    /// Statement selecting all columns of the table.
    pub select_sql: String,
}

impl SourceMetadata {
    pub fn new(columns: Vec<SourceColumn>, select_sql: impl Into<String>) -> Self {
        Self {
            columns,
            select_sql: select_sql.into(),
        }
    }

    pub fn column(&self, name: &str) -> Option<&SourceColumn> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// One table to load: source identity, resolved metadata and target layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableJob {
    pub schema: String,
    pub table: String,

    /// Present when metadata discovery succeeded.
    pub metadata: Option<SourceMetadata>,

    pub target: TargetSchema,

    /// Auxiliary table per blob column name.
    #[serde(default)]
    pub blob_targets: HashMap<String, TargetSchema>,

    /// Set once any stage fails for this table; later stages skip it.
    #[serde(default)]
    pub failure: bool,
}

impl TableJob {
    pub fn new(schema: impl Into<String>, table: impl Into<String>, target: TargetSchema) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
            metadata: None,
            target,
            blob_targets: HashMap::new(),
            failure: false,
        }
    }

    pub fn with_metadata(mut self, metadata: SourceMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_blob_target(mut self, column: impl Into<String>, target: TargetSchema) -> Self {
        self.blob_targets.insert(column.into(), target);
        self
    }

    /// Whether source metadata has been resolved.
    pub fn is_valid(&self) -> bool {
        self.metadata.is_some()
    }

    /// Qualified source name, e.g. `dbo.orders`.
    pub fn full_name(&self) -> String {
        if self.schema.is_empty() {
            self.table.clone()
        } else {
            format!("{}.{}", self.schema, self.table)
        }
    }
}
