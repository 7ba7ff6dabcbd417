//! Program state at the entry of the analysed code.

use std::collections::BTreeMap;

use crate::{analysis::sem::{MemType, Reg}, Result};

/// An initialized data segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// Address of the first byte.
    pub base: u32,
    /// Segment contents.
    pub bytes: Vec<u8>,
}

impl Segment {
    /// Returns true if `[address, address + len)` lies within the segment.
    fn covers(&self, address: u32, len: u32) -> bool {
        let end = u64::from(self.base) + self.bytes.len() as u64;
        address >= self.base && u64::from(address) + u64::from(len) <= end
    }
}

/// Known register and memory contents when the analysed code starts.
///
/// # Examples
///
/// ```rust,ignore
/// use pidcache::address::InitialState;
/// use pidcache::analysis::Reg;
///
/// let init = InitialState::new(Reg::Machine(13))
///     .with_register(Reg::Machine(0), 0x2000)?
///     .with_word(0x9000, 0x4000)
///     .with_segment(0x1000, vec![0x10, 0x00, 0x00, 0x00]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitialState {
    /// Register holding the stack pointer.
    pub stack_pointer: Reg,
    /// Registers with a known constant value.
    pub registers: BTreeMap<Reg, i32>,
    /// Memory words with a known constant value.
    pub memory: BTreeMap<u32, i32>,
    /// Initialized data, read by loads that find nothing in the abstract memory.
    pub image: Vec<Segment>,
}

impl Default for InitialState {
    /// Nothing known; the stack pointer is `r13`, as on ARM.
    fn default() -> Self {
        Self::new(Reg::Machine(13))
    }
}

impl InitialState {
    /// Creates a state where only the stack pointer register is named.
    #[must_use]
    pub fn new(stack_pointer: Reg) -> Self {
        Self {
            stack_pointer,
            registers: BTreeMap::new(),
            memory: BTreeMap::new(),
            image: Vec::new(),
        }
    }

    /// Sets a register to a constant.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] for temporaries, which do not exist
    /// outside an instruction.
    pub fn with_register(mut self, reg: Reg, value: i32) -> Result<Self> {
        if reg.is_temp() {
            return Err(malformed_error!("initial value given for temporary {}", reg));
        }
        self.registers.insert(reg, value);
        Ok(self)
    }

    /// Sets a memory word to a constant.
    #[must_use]
    pub fn with_word(mut self, address: u32, value: i32) -> Self {
        self.memory.insert(address, value);
        self
    }

    /// Adds an initialized data segment.
    #[must_use]
    pub fn with_segment(mut self, base: u32, bytes: Vec<u8>) -> Self {
        self.image.push(Segment { base, bytes });
        self
    }

    /// Reads a little-endian value of type `ty` from the data image.
    ///
    /// Returns `None` if no segment holds every byte of the value.
    #[must_use]
    pub fn read(&self, address: u32, ty: MemType) -> Option<i32> {
        let size = ty.size();
        let segment = self.image.iter().find(|s| s.covers(address, size))?;
        let offset = (address - segment.base) as usize;
        let bytes = segment.bytes.get(offset..offset + size as usize)?;
        let value = match ty {
            MemType::Int8 => i32::from(bytes[0] as i8),
            MemType::UInt8 => i32::from(bytes[0]),
            MemType::Int16 => i32::from(i16::from_le_bytes([bytes[0], bytes[1]])),
            MemType::UInt16 => i32::from(u16::from_le_bytes([bytes[0], bytes[1]])),
            MemType::Int32 | MemType::UInt32 => {
                i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
            }
        };
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn test_image_reads() {
        let init = InitialState::new(Reg::Machine(13))
            .with_segment(0x1000, vec![0xff, 0x80, 0x34, 0x12, 0x01]);

        assert_eq!(init.read(0x1000, MemType::Int8), Some(-1));
        assert_eq!(init.read(0x1000, MemType::UInt8), Some(0xff));
        assert_eq!(init.read(0x1000, MemType::Int16), Some(-32513));
        assert_eq!(init.read(0x1000, MemType::UInt16), Some(0x80ff));
        assert_eq!(init.read(0x1001, MemType::UInt32), Some(0x0112_3480));
        assert_eq!(init.read(0x1002, MemType::UInt32), None);
        assert_eq!(init.read(0x0fff, MemType::UInt8), None);
    }

    #[test]
    fn test_registers() {
        let init = InitialState::new(Reg::Machine(13))
            .with_register(Reg::Machine(1), 0x40)
            .unwrap()
            .with_word(0x2000, 7);
        assert_eq!(init.registers.get(&Reg::Machine(1)), Some(&0x40));
        assert_eq!(init.memory.get(&0x2000), Some(&7));

        let err = InitialState::new(Reg::Machine(13)).with_register(Reg::Temp(0), 1);
        assert!(matches!(err, Err(Error::Malformed { .. })));
    }
}
