//! Per-architecture details: how to recognize the ELF core and how to encode its
//! thread state in the Mach-O core. Supporting another architecture means adding an
//! Arch impl to ARCHES.
use super::{FLAVOR_HEADER_SIZE, write_flavor};
use crate::elf::PrStatus;
use crate::error::CoreError;

pub trait Arch {
    fn name(&self) -> &'static str;

    /// e_machine in the ELF header.
    fn elf_machine(&self) -> u16;

    fn cpu_type(&self) -> u32;

    fn cpu_subtype(&self) -> u32;

    /// Number of xword registers in elf_prstatus's pr_reg.
    fn num_registers(&self) -> usize;

    /// Instruction pointer, only used for reporting.
    fn ip(&self, status: &PrStatus) -> u64;

    /// Size of everything in an LC_THREAD after the command header.
    fn thread_state_size(&self) -> usize;

    /// Appends the flavors for one thread, exactly thread_state_size bytes.
    fn write_thread_state(&self, status: &PrStatus, out: &mut Vec<u8>);
}

pub static ARCHES: [&(dyn Arch + Sync); 1] = [&X86_64];

pub fn find_arch(name: &str) -> Result<&'static dyn Arch, CoreError> {
    match ARCHES.iter().find(|a| a.name() == name) {
        Some(arch) => Ok(*arch),
        None => Err(CoreError::UnknownArch {
            name: name.to_string(),
            supported: ARCHES.iter().map(|a| a.name()).collect::<Vec<_>>().join(", "),
        }),
    }
}

const CPU_ARCH_ABI64: u32 = 0x01000000;
const CPU_TYPE_X86: u32 = 7;
const CPU_TYPE_X86_64: u32 = CPU_TYPE_X86 | CPU_ARCH_ABI64;
const CPU_SUBTYPE_X86_64_ALL: u32 = 3;

const X86_THREAD_STATE64: u32 = 4;
const X86_FLOAT_STATE64: u32 = 5;

/// sizeof(x86_thread_state64_t): 21 xwords.
const X86_THREAD_STATE64_SIZE: usize = 21 * 8;

/// sizeof(x86_float_state64_t).
const X86_FLOAT_STATE64_SIZE: usize = 524;

pub struct X86_64;

impl X86_64 {
    /// Maps pt_regs (r15, r14, r13, r12, rbp, rbx, r11, r10, r9, r8, rax, rcx, rdx,
    /// rsi, rdi, orig_rax, rip, cs, eflags, rsp, ss, fs_base, gs_base, ds, es, fs, gs)
    /// onto x86_thread_state64_t (rax, rbx, rcx, rdx, rdi, rsi, rbp, rsp, r8-r15, rip,
    /// rflags, cs, fs, gs).
    fn thread_state(&self, regs: &[u64]) -> [u64; 21] {
        [
            regs[10], // rax
            regs[5],  // rbx
            regs[11], // rcx
            regs[12], // rdx
            regs[14], // rdi
            regs[13], // rsi
            regs[4],  // rbp
            regs[19], // rsp
            regs[9],  // r8
            regs[8],  // r9
            regs[7],  // r10
            regs[6],  // r11
            regs[3],  // r12
            regs[2],  // r13
            regs[1],  // r14
            regs[0],  // r15
            regs[16], // rip
            regs[18], // rflags
            regs[17], // cs
            regs[25], // fs
            regs[26], // gs
        ]
    }
}

impl Arch for X86_64 {
    fn name(&self) -> &'static str {
        "x86_64"
    }

    fn elf_machine(&self) -> u16 {
        0x3e
    }

    fn cpu_type(&self) -> u32 {
        CPU_TYPE_X86_64
    }

    fn cpu_subtype(&self) -> u32 {
        CPU_SUBTYPE_X86_64_ALL
    }

    fn num_registers(&self) -> usize {
        27
    }

    fn ip(&self, status: &PrStatus) -> u64 {
        status.registers[16]
    }

    fn thread_state_size(&self) -> usize {
        2 * FLAVOR_HEADER_SIZE + X86_THREAD_STATE64_SIZE + X86_FLOAT_STATE64_SIZE
    }

    fn write_thread_state(&self, status: &PrStatus, out: &mut Vec<u8>) {
        let mut state = Vec::with_capacity(X86_THREAD_STATE64_SIZE);
        for reg in self.thread_state(&status.registers) {
            state.extend_from_slice(&reg.to_le_bytes());
        }
        write_flavor(out, X86_THREAD_STATE64, &state);

        // Floating point registers aren't converted (yet): debuggers get zeros.
        write_flavor(out, X86_FLOAT_STATE64, &[0u8; X86_FLOAT_STATE64_SIZE]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::test_core::X86_64_REGISTERS;

    fn status() -> PrStatus {
        PrStatus {
            signal_num: 11,
            signal_code: 1,
            pid: 100,
            registers: X86_64_REGISTERS.to_vec(),
        }
    }

    fn xwords(bytes: &[u8]) -> Vec<u64> {
        bytes
            .chunks(8)
            .map(|c| u64::from_le_bytes(c.try_into().unwrap()))
            .collect()
    }

    #[test]
    fn registry() {
        assert_eq!(find_arch("x86_64").unwrap().name(), "x86_64");
        let err = find_arch("ppc").err().unwrap();
        insta::assert_snapshot!(err.to_string(), @"unknown architecture ppc (supported: x86_64)");
    }

    #[test]
    fn x86_64_thread_state() {
        let mut out = Vec::new();
        X86_64.write_thread_state(&status(), &mut out);
        assert_eq!(out.len(), X86_64.thread_state_size());
        assert_eq!(out.len(), 708);

        assert_eq!(&out[0..4], &X86_THREAD_STATE64.to_le_bytes());
        assert_eq!(&out[4..8], &42u32.to_le_bytes());
        let regs = xwords(&out[8..8 + X86_THREAD_STATE64_SIZE]);
        assert_eq!(
            regs,
            vec![
                0xa000, 0xb100, 0xc000, 0xd000, 0xd100, 0x5100, 0xb000, 0x5000, 0x0800,
                0x0900, 0x1000, 0x1100, 0x1200, 0x1300, 0x1400, 0x1500, 0x7000, 0x246,
                0x33, 0x63, 0x6b
            ]
        );

        let float = &out[8 + X86_THREAD_STATE64_SIZE..];
        assert_eq!(&float[0..4], &X86_FLOAT_STATE64.to_le_bytes());
        assert_eq!(&float[4..8], &131u32.to_le_bytes());
        assert!(float[8..].iter().all(|b| *b == 0));
    }

    #[test]
    fn x86_64_ip() {
        assert_eq!(X86_64.ip(&status()), 0x7000);
    }
}
