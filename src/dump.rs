// Offline views of a generated routine: an ELF relocatable that objdump or a debugger can
// load, and a plain hexadecimal listing with byte offsets.

//! Routine dumps.

use object::write::{Object, StandardSection, Symbol, SymbolSection};
use object::{Architecture, BinaryFormat, Endianness, SymbolFlags, SymbolKind, SymbolScope};
use std::fmt::Write;

use crate::core::error::JitResult;

/// Build an AArch64 ELF object with `words` in `.text` and one global function `symbol`
/// covering them.
pub fn routine_object(words: &[u32], symbol: &str) -> JitResult<Vec<u8>> {
    let mut obj = Object::new(BinaryFormat::Elf, Architecture::Aarch64, Endianness::Little);
    let text = obj.section_id(StandardSection::Text);

    let bytes: Vec<u8> = words.iter().flat_map(|word| word.to_le_bytes()).collect();
    let offset = obj.append_section_data(text, &bytes, 4);
    obj.add_symbol(Symbol {
        name: symbol.as_bytes().to_vec(),
        value: offset,
        size: bytes.len() as u64,
        kind: SymbolKind::Text,
        scope: SymbolScope::Linkage,
        weak: false,
        section: SymbolSection::Section(text),
        flags: SymbolFlags::None,
    });

    Ok(obj.write()?)
}

/// One line per instruction word: `offset: word`.
pub fn hex_listing(words: &[u32]) -> String {
    let mut out = String::with_capacity(words.len() * 16);
    for (i, word) in words.iter().enumerate() {
        let _ = writeln!(out, "{:06x}: {:08x}", i * 4, word);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listing_has_byte_offsets() {
        let listing = hex_listing(&[0xd503_201f, 0xd65f_03c0]);
        assert_eq!(listing, "000000: d503201f\n000004: d65f03c0\n");
    }

    #[test]
    fn empty_routine_still_writes() {
        let obj = routine_object(&[], "empty").unwrap();
        assert_eq!(&obj[..4], b"\x7fELF");
    }
}
