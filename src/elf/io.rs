use crate::error::CoreError;
use memmap2::Mmap;
use std::error::Error;

/// Size of Elf64_Ehdr. Anything smaller can't be a core file.
pub const ELF_HEADER_SIZE: usize = 64;

pub struct Reader {
    pub little_endian: bool,
    bytes: Mmap,
}

impl Reader {
    /// Note that the read functions all return a Result because core files are sometimes
    /// truncated or otherwise corrupted.
    pub fn new(bytes: Mmap) -> Result<Self, Box<dyn Error>> {
        // see https://en.wikipedia.org/wiki/Executable_and_Linkable_Format
        if bytes.len() < ELF_HEADER_SIZE {
            return Err(CoreError::format("core file is much too small").into());
        }
        if bytes[0..4] != [0x7f, 0x45, 0x4c, 0x46] {
            return Err(CoreError::format("not an ELF file (bad magic)").into());
        }

        // Class is checked later by ElfHeader::validate.
        let ei_data = bytes[0x05];
        Ok(Reader {
            little_endian: ei_data == 1,
            bytes,
        })
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn slice(&self, offset: usize, size: usize) -> Result<&[u8], Box<dyn Error>> {
        match offset.checked_add(size) {
            Some(end) if end <= self.bytes.len() => Ok(&self.bytes[offset..end]),
            _ => Err(format!("{size} bytes at offset {offset:#x} are out of bounds").into()),
        }
    }

    pub fn read_byte(&self, offset: usize) -> Result<u8, Box<dyn Error>> {
        self.bytes
            .get(offset)
            .copied()
            .ok_or_else(|| format!("couldn't read byte at offset {offset:#x}").into())
    }

    pub fn read_half(&self, offset: usize) -> Result<u16, Box<dyn Error>> {
        let slice = self.slice(offset, 2)?;
        if self.little_endian {
            Ok(u16::from_le_bytes(slice.try_into()?))
        } else {
            Ok(u16::from_be_bytes(slice.try_into()?))
        }
    }

    pub fn read_word(&self, offset: usize) -> Result<u32, Box<dyn Error>> {
        let slice = self.slice(offset, 4)?;
        if self.little_endian {
            Ok(u32::from_le_bytes(slice.try_into()?))
        } else {
            Ok(u32::from_be_bytes(slice.try_into()?))
        }
    }

    pub fn read_xword(&self, offset: usize) -> Result<u64, Box<dyn Error>> {
        let slice = self.slice(offset, 8)?;
        if self.little_endian {
            Ok(u64::from_le_bytes(slice.try_into()?))
        } else {
            Ok(u64::from_be_bytes(slice.try_into()?))
        }
    }
}

pub struct Stream<'a> {
    pub reader: &'a Reader,
    pub offset: usize,
}

impl<'a> Stream<'a> {
    pub fn new(reader: &'a Reader, offset: usize) -> Self {
        Stream { reader, offset }
    }

    pub fn read_half(&mut self) -> Result<u16, Box<dyn Error>> {
        let half = self.reader.read_half(self.offset)?;
        self.offset += 2;
        Ok(half)
    }

    pub fn read_word(&mut self) -> Result<u32, Box<dyn Error>> {
        let word = self.reader.read_word(self.offset)?;
        self.offset += 4;
        Ok(word)
    }

    pub fn read_xword(&mut self) -> Result<u64, Box<dyn Error>> {
        let xword = self.reader.read_xword(self.offset)?;
        self.offset += 8;
        Ok(xword)
    }

    pub fn read_int(&mut self) -> Result<i32, Box<dyn Error>> {
        let word = self.reader.read_word(self.offset)?;
        self.offset += 4;
        Ok(word as i32)
    }

    /// Only 64-bit cores are converted so addresses and offsets are always xwords.
    pub fn read_addr(&mut self) -> Result<u64, Box<dyn Error>> {
        self.read_xword()
    }

    pub fn read_offset(&mut self) -> Result<u64, Box<dyn Error>> {
        self.read_xword()
    }

    /// Read a null-terminated string that must end before limit.
    pub fn read_string(&mut self, limit: usize) -> Result<String, Box<dyn Error>> {
        let mut bytes = Vec::new();
        loop {
            if self.offset >= limit {
                return Err("string is not null terminated".into());
            }
            let byte = self.reader.read_byte(self.offset)?;
            self.offset += 1;
            if byte == 0 {
                break;
            }
            bytes.push(byte);
        }
        // Paths are bytes to the kernel so don't fail on bad UTF-8.
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}
