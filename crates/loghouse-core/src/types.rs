//! The LogHouse Type System
//!
//! Every value carries one of a closed set of types. Primitives each have a
//! stable small integer id ([`TypeId`]) used for comparator selection and
//! wire framing; containers (`set`, `vector`, `record`) wrap an element type
//! or an interned schema.
//!
//! ## Identity
//! Primitive types are identified by their [`TypeId`]. Record types are
//! identified by their interned [`Schema`](crate::Schema), so two record
//! types compare equal exactly when their column lists were interned to the
//! same schema in a [`TypeContext`](crate::TypeContext).
//!
//! ## Canonical names
//! `Display` renders the canonical textual name (`int64`, `set[string]`,
//! `record[ts:time,host:string]`). The sort stage relies on these strings as
//! a tie-break that is stable across runs when it compares values of
//! different types.

use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::schema::Schema;

/// Stable small integer ids for every type kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum TypeId {
    Bool = 0,
    Int16 = 1,
    Int32 = 2,
    Int64 = 3,
    Uint16 = 4,
    Uint32 = 5,
    Uint64 = 6,
    Float64 = 7,
    String = 8,
    Bytes = 9,
    Ip = 10,
    Net = 11,
    Port = 12,
    Time = 13,
    Duration = 14,
    Enum = 15,
    Set = 16,
    Vector = 17,
    Record = 18,
}

/// A column type: a primitive, or a container of a type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Bool,
    Int16,
    Int32,
    Int64,
    Uint16,
    Uint32,
    Uint64,
    Float64,
    String,
    Bytes,
    Ip,
    Net,
    Port,
    Time,
    Duration,
    Enum,
    /// Unordered, deduplicated collection; canonical order is lexicographic
    /// byte order of the encoded elements.
    Set(Box<Type>),
    /// Ordered sequence.
    Vector(Box<Type>),
    /// Nested record with an interned schema.
    Record(Arc<Schema>),
}

impl Type {
    pub fn type_id(&self) -> TypeId {
        match self {
            Type::Bool => TypeId::Bool,
            Type::Int16 => TypeId::Int16,
            Type::Int32 => TypeId::Int32,
            Type::Int64 => TypeId::Int64,
            Type::Uint16 => TypeId::Uint16,
            Type::Uint32 => TypeId::Uint32,
            Type::Uint64 => TypeId::Uint64,
            Type::Float64 => TypeId::Float64,
            Type::String => TypeId::String,
            Type::Bytes => TypeId::Bytes,
            Type::Ip => TypeId::Ip,
            Type::Net => TypeId::Net,
            Type::Port => TypeId::Port,
            Type::Time => TypeId::Time,
            Type::Duration => TypeId::Duration,
            Type::Enum => TypeId::Enum,
            Type::Set(_) => TypeId::Set,
            Type::Vector(_) => TypeId::Vector,
            Type::Record(_) => TypeId::Record,
        }
    }

    /// Whether values of this type are encoded as containers.
    pub fn is_container(&self) -> bool {
        matches!(self, Type::Set(_) | Type::Vector(_) | Type::Record(_))
    }

    /// The numeric family: signed, unsigned, float, plus port and duration,
    /// which compare numerically.
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Type::Int16
                | Type::Int32
                | Type::Int64
                | Type::Uint16
                | Type::Uint32
                | Type::Uint64
                | Type::Float64
                | Type::Port
                | Type::Duration
        )
    }

    pub fn is_signed(&self) -> bool {
        matches!(
            self,
            Type::Int16 | Type::Int32 | Type::Int64 | Type::Duration
        )
    }

    pub fn is_unsigned(&self) -> bool {
        matches!(
            self,
            Type::Uint16 | Type::Uint32 | Type::Uint64 | Type::Port
        )
    }

    /// Element type of a set or vector. `None` for everything else,
    /// including records, whose elements are typed per column.
    pub fn inner(&self) -> Option<&Type> {
        match self {
            Type::Set(inner) | Type::Vector(inner) => Some(inner),
            _ => None,
        }
    }

    /// The schema of a nested record type.
    pub fn record_schema(&self) -> Option<&Arc<Schema>> {
        match self {
            Type::Record(schema) => Some(schema),
            _ => None,
        }
    }

    /// Parse a canonical primitive or container type name. Record types
    /// cannot be named textually; they come from schema interning.
    pub fn parse(name: &str) -> Result<Type> {
        if let Some(rest) = name.strip_prefix("set[") {
            let inner = rest
                .strip_suffix(']')
                .ok_or_else(|| Error::UnknownType(name.to_string()))?;
            return Ok(Type::Set(Box::new(Type::parse(inner)?)));
        }
        if let Some(rest) = name.strip_prefix("vector[") {
            let inner = rest
                .strip_suffix(']')
                .ok_or_else(|| Error::UnknownType(name.to_string()))?;
            return Ok(Type::Vector(Box::new(Type::parse(inner)?)));
        }
        match name {
            "bool" => Ok(Type::Bool),
            "int16" => Ok(Type::Int16),
            "int32" => Ok(Type::Int32),
            "int64" => Ok(Type::Int64),
            "uint16" => Ok(Type::Uint16),
            "uint32" => Ok(Type::Uint32),
            "uint64" => Ok(Type::Uint64),
            "float64" => Ok(Type::Float64),
            "string" => Ok(Type::String),
            "bytes" => Ok(Type::Bytes),
            "ip" => Ok(Type::Ip),
            "net" => Ok(Type::Net),
            "port" => Ok(Type::Port),
            "time" => Ok(Type::Time),
            "duration" => Ok(Type::Duration),
            "enum" => Ok(Type::Enum),
            _ => Err(Error::UnknownType(name.to_string())),
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Bool => write!(f, "bool"),
            Type::Int16 => write!(f, "int16"),
            Type::Int32 => write!(f, "int32"),
            Type::Int64 => write!(f, "int64"),
            Type::Uint16 => write!(f, "uint16"),
            Type::Uint32 => write!(f, "uint32"),
            Type::Uint64 => write!(f, "uint64"),
            Type::Float64 => write!(f, "float64"),
            Type::String => write!(f, "string"),
            Type::Bytes => write!(f, "bytes"),
            Type::Ip => write!(f, "ip"),
            Type::Net => write!(f, "net"),
            Type::Port => write!(f, "port"),
            Type::Time => write!(f, "time"),
            Type::Duration => write!(f, "duration"),
            Type::Enum => write!(f, "enum"),
            Type::Set(inner) => write!(f, "set[{}]", inner),
            Type::Vector(inner) => write!(f, "vector[{}]", inner),
            Type::Record(schema) => {
                write!(f, "record[")?;
                for (i, col) in schema.columns().iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}:{}", col.name, col.ty)?;
                }
                write!(f, "]")
            }
        }
    }
}
