// JDWP type definitions
//
// Common types used across the JDWP protocol

use serde::{Deserialize, Serialize};

// Ids are carried as u64; the VM decides the width actually used on the wire
pub type ObjectId = u64;
pub type ThreadId = ObjectId;
pub type StringId = ObjectId;

pub type ReferenceTypeId = u64;
pub type ClassId = ReferenceTypeId;

pub type MethodId = u64;
pub type FieldId = u64;

/// Widths in bytes of the variable-size ids, as reported by
/// VirtualMachine.IDSizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdSizes {
    pub field_id_size: usize,
    pub method_id_size: usize,
    pub object_id_size: usize,
    pub reference_type_id_size: usize,
    pub frame_id_size: usize,
}

impl Default for IdSizes {
    fn default() -> Self {
        Self {
            field_id_size: 8,
            method_id_size: 8,
            object_id_size: 8,
            reference_type_id_size: 8,
            frame_id_size: 8,
        }
    }
}

// Location identifies a code position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub type_tag: u8, // 1=class, 2=interface, 3=array
    pub class_id: ReferenceTypeId,
    pub method_id: MethodId,
    pub index: u64, // bytecode index (PC)
}

// Type tags for values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TypeTag {
    Array = 91,        // '['
    Byte = 66,         // 'B'
    Char = 67,         // 'C'
    Object = 76,       // 'L'
    Float = 70,        // 'F'
    Double = 68,       // 'D'
    Int = 73,          // 'I'
    Long = 74,         // 'J'
    Short = 83,        // 'S'
    Void = 86,         // 'V'
    Boolean = 90,      // 'Z'
    String = 115,      // 's'
    Thread = 116,      // 't'
    ThreadGroup = 103, // 'g'
    ClassLoader = 108, // 'l'
    ClassObject = 99,  // 'c'
}

impl TypeTag {
    pub fn from_u8(tag: u8) -> Option<Self> {
        Some(match tag {
            b'[' => TypeTag::Array,
            b'B' => TypeTag::Byte,
            b'C' => TypeTag::Char,
            b'L' => TypeTag::Object,
            b'F' => TypeTag::Float,
            b'D' => TypeTag::Double,
            b'I' => TypeTag::Int,
            b'J' => TypeTag::Long,
            b'S' => TypeTag::Short,
            b'V' => TypeTag::Void,
            b'Z' => TypeTag::Boolean,
            b's' => TypeTag::String,
            b't' => TypeTag::Thread,
            b'g' => TypeTag::ThreadGroup,
            b'l' => TypeTag::ClassLoader,
            b'c' => TypeTag::ClassObject,
            _ => return None,
        })
    }
}

// Tagged value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Value {
    pub tag: u8,
    pub data: ValueData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ValueData {
    Byte(i8),
    Char(u16),
    Float(f32),
    Double(f64),
    Int(i32),
    Long(i64),
    Short(i16),
    Boolean(bool),
    Object(ObjectId),
    Void,
}

impl Value {
    /// Format value for display
    pub fn format(&self) -> String {
        match &self.data {
            ValueData::Byte(v) => format!("(byte) {}", v),
            ValueData::Char(v) => format!("(char) '{}'", char::from_u32(*v as u32).unwrap_or('?')),
            ValueData::Float(v) => format!("(float) {}", v),
            ValueData::Double(v) => format!("(double) {}", v),
            ValueData::Int(v) => format!("(int) {}", v),
            ValueData::Long(v) => format!("(long) {}", v),
            ValueData::Short(v) => format!("(short) {}", v),
            ValueData::Boolean(v) => format!("(boolean) {}", v),
            ValueData::Object(id) => {
                if *id == 0 {
                    "(object) null".to_string()
                } else {
                    format!("(object) @{:x}", id)
                }
            }
            ValueData::Void => "(void)".to_string(),
        }
    }
}
