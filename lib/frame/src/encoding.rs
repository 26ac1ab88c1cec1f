//! The 32-bit encoding tag: low 16 bits identify the primitive type, upper 16 bits flag nesting
//! and semantic role. Generalizes a small-integer-id idiom to a fixed tag space instead of a
//! process-assigned one.

/// Primitive base type, the low 16 bits of an encoding.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
#[repr(u16)]
pub enum BaseType {
    Bool = 0,
    Int8 = 1,
    Int16 = 2,
    Int32 = 3,
    Int64 = 4,
    Uint8 = 5,
    Uint16 = 6,
    Uint32 = 7,
    Uint64 = 8,
    Float32 = 9,
    Float64 = 10,
    Time64 = 11,
    String = 12,
}

impl BaseType {
    #[inline]
    pub fn from_u16(raw: u16) -> Option<BaseType> {
        Some(match raw {
            0 => BaseType::Bool,
            1 => BaseType::Int8,
            2 => BaseType::Int16,
            3 => BaseType::Int32,
            4 => BaseType::Int64,
            5 => BaseType::Uint8,
            6 => BaseType::Uint16,
            7 => BaseType::Uint32,
            8 => BaseType::Uint64,
            9 => BaseType::Float32,
            10 => BaseType::Float64,
            11 => BaseType::Time64,
            12 => BaseType::String,
            _ => return None,
        })
    }

    /// Byte size of a single element of this type when serialized, `None` for variable-length
    /// types (strings).
    #[inline]
    pub fn fixed_size(self) -> Option<usize> {
        Some(match self {
            BaseType::Bool | BaseType::Int8 | BaseType::Uint8 => 1,
            BaseType::Int16 | BaseType::Uint16 => 2,
            BaseType::Int32 | BaseType::Uint32 | BaseType::Float32 => 4,
            BaseType::Int64 | BaseType::Uint64 | BaseType::Float64 | BaseType::Time64 => 8,
            BaseType::String => return None,
        })
    }
}

bitflags::bitflags! {
    /// Upper 16 bits of an encoding: nesting shape and semantic column role.
    #[derive(Default)]
    pub struct RoleFlags: u16 {
        const NESTED_COLUMN = 0b0000_0001;
        const NESTED_ARRAY   = 0b0000_0010;
        const NESTED_LIST    = 0b0000_0100;
        const TIME_COLUMN    = 0b0001_0000;
        const X_COLUMN       = 0b0010_0000;
        const Y_COLUMN       = 0b0100_0000;
        const Z_COLUMN       = 0b1000_0000;
    }
}

/// The full 32-bit encoding: base type plus role flags.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct Encoding {
    pub base: BaseType,
    pub role: RoleFlags,
}

impl Encoding {
    #[inline]
    pub fn new(base: BaseType) -> Encoding {
        Encoding {
            base,
            role: RoleFlags::empty(),
        }
    }

    #[inline]
    pub fn with_role(base: BaseType, role: RoleFlags) -> Encoding {
        Encoding { base, role }
    }

    #[inline]
    pub fn to_u32(self) -> u32 {
        (self.base as u32) | ((self.role.bits() as u32) << 16)
    }

    #[inline]
    pub fn from_u32(raw: u32) -> Option<Encoding> {
        let base = BaseType::from_u16((raw & 0xFFFF) as u16)?;
        let role = RoleFlags::from_bits_truncate((raw >> 16) as u16);
        Some(Encoding { base, role })
    }
}
