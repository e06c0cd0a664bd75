//! Assembles a [`DeviceRule`] ruleset into cgroup-device classifier
//! bytecode (spec §4.6). Ported instruction-for-instruction from
//! `libcgroups::v2::devices::program::Program`, generalized from
//! `oci_spec::runtime::LinuxDeviceCgroup` to this crate's own
//! [`DeviceRule`], and with the rule-entry type check driven by the
//! spec's own [`DefaultPolicy`] epilogue value instead of a bare bool.
//!
//! The jump arithmetic is the one place in this crate where an off-by-one
//! is silent until it hits a real kernel: each rule's `JNE` offsets must
//! equal exactly the count of instructions emitted after it, up to and
//! including that rule's own terminal `exit`.

use rbpf::insn_builder::{Arch as RbpfArch, BpfCode, Cond, MemSize, Source, *};

use super::rule::{Access, DefaultPolicy, DeviceNumber, DeviceRule, DeviceType, Policy};

#[derive(thiserror::Error, Debug)]
pub enum ProgramError {
    #[error("rule type `any` must be collapsed into the default policy before assembly")]
    UnexpectedGlobalRule,
    #[error("rule has empty access mask")]
    EmptyAccess,
}

pub struct Program {
    prog: BpfCode,
}

impl Program {
    pub fn from_rules(
        rules: &[DeviceRule],
        default_policy: DefaultPolicy,
    ) -> Result<Self, ProgramError> {
        let mut prog = Program {
            prog: BpfCode::new(),
        };
        prog.init();

        // Matched in the order a real walk over the ruleset would return
        // the first hit, so emit instructions for the *last* rule first:
        // falling through every match block means "no rule matched yet",
        // and the first block physically placed is the first one tested.
        for rule in rules.iter().rev() {
            prog.add_rule(rule)?;
        }
        prog.finalize(default_policy);
        Ok(prog)
    }

    pub fn bytecodes(&self) -> &[u8] {
        self.prog.into_bytes()
    }

    fn finalize(&mut self, default_policy: DefaultPolicy) {
        self.prog
            .mov(Source::Imm, RbpfArch::X32)
            .set_dst(0)
            .set_imm(default_policy.allows_by_default() as i32)
            .push();

        self.prog.exit().push();
    }

    // struct bpf_cgroup_dev_ctx (spec §6 "eBPF interface"):
    //   u32 access_type (low 16 bits = device kind, high 16 bits = access)
    //   u32 major
    //   u32 minor
    // R2 <- device kind, R3 <- access mask, R4 <- major, R5 <- minor.
    fn init(&mut self) {
        self.prog
            .load_x(MemSize::Word)
            .set_src(1)
            .set_off(0)
            .set_dst(2)
            .push();

        self.prog
            .bit_and(Source::Imm, RbpfArch::X32)
            .set_dst(2)
            .set_imm(0xFFFF)
            .push();

        self.prog
            .load_x(MemSize::Word)
            .set_src(1)
            .set_off(0)
            .set_dst(3)
            .push();

        self.prog
            .right_shift(Source::Imm, RbpfArch::X32)
            .set_imm(16)
            .set_dst(3)
            .push();

        self.prog
            .load_x(MemSize::Word)
            .set_src(1)
            .set_off(4)
            .set_dst(4)
            .push();

        self.prog
            .load_x(MemSize::Word)
            .set_src(1)
            .set_off(8)
            .set_dst(5)
            .push();
    }

    fn add_rule(&mut self, rule: &DeviceRule) -> Result<(), ProgramError> {
        if rule.is_global() {
            return Err(ProgramError::UnexpectedGlobalRule);
        }
        if rule.access.is_empty() {
            return Err(ProgramError::EmptyAccess);
        }

        let dev_type = bpf_dev_type(rule.typ);
        let access = rule.access.bits() as i32;
        let has_access = rule.access != Access::all();

        let has_major = matches!(rule.major, DeviceNumber::Concrete(_));
        let has_minor = matches!(rule.minor, DeviceNumber::Concrete(_));

        let mut instruction_count = 1; // the type-check jump's own fallthrough counts as one block head
        if has_access {
            instruction_count += 3;
        }
        if has_major {
            instruction_count += 1;
        }
        if has_minor {
            instruction_count += 1;
        }
        instruction_count += 2; // trailing mov + exit

        let mut next_rule_offset = instruction_count - 1;
        self.prog
            .jump_conditional(Cond::NotEquals, Source::Imm)
            .set_dst(2)
            .set_imm(dev_type as i32)
            .set_off(next_rule_offset)
            .push();

        if has_access {
            next_rule_offset -= 3;
            self.prog
                .mov(Source::Reg, RbpfArch::X32)
                .set_dst(1)
                .set_src(3)
                .push();

            self.prog
                .bit_and(Source::Imm, RbpfArch::X32)
                .set_dst(1)
                .set_imm(access)
                .push();

            self.prog
                .jump_conditional(Cond::NotEquals, Source::Reg)
                .set_dst(1)
                .set_src(3)
                .set_off(next_rule_offset)
                .push();
        }

        if let DeviceNumber::Concrete(major) = rule.major {
            next_rule_offset -= 1;
            self.prog
                .jump_conditional(Cond::NotEquals, Source::Imm)
                .set_dst(4)
                .set_imm(major as i32)
                .set_off(next_rule_offset)
                .push();
        }

        if let DeviceNumber::Concrete(minor) = rule.minor {
            next_rule_offset -= 1;
            self.prog
                .jump_conditional(Cond::NotEquals, Source::Imm)
                .set_dst(5)
                .set_imm(minor as i32)
                .set_off(next_rule_offset)
                .push();
        }

        self.prog
            .mov(Source::Imm, RbpfArch::X32)
            .set_dst(0)
            .set_imm(matches!(rule.allow, Policy::Allow) as i32)
            .push();
        self.prog.exit().push();

        Ok(())
    }

    /// Runs the assembled program in rbpf's userspace interpreter against
    /// one synthetic access, for tests and for the bootstrap capability
    /// probe (`super::probe_supported`).
    pub fn execute(&self, typ: DeviceType, major: u32, minor: u32, access: Access) -> u64 {
        let mut mem = bpf_cgroup_dev_ctx(typ, major, minor, access);
        let vm = rbpf::EbpfVmRaw::new(Some(self.prog.into_bytes())).expect("valid bytecode");
        vm.execute_program(&mut mem[..]).unwrap_or(0)
    }
}

fn bpf_dev_type(typ: DeviceType) -> u32 {
    match typ {
        DeviceType::Char => libbpf_sys::BPF_DEVCG_DEV_CHAR,
        DeviceType::Block => libbpf_sys::BPF_DEVCG_DEV_BLOCK,
        DeviceType::Any => 0,
    }
}

fn bpf_cgroup_dev_ctx(typ: DeviceType, major: u32, minor: u32, access: Access) -> Vec<u8> {
    let mut mem = Vec::with_capacity(12);
    let type_access = (bpf_dev_type(typ) & 0xFFFF) | ((access.bits() as u32) << 16);
    mem.extend_from_slice(&type_access.to_ne_bytes());
    mem.extend_from_slice(&major.to_ne_bytes());
    mem.extend_from_slice(&minor.to_ne_bytes());
    mem
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::emulator::Emulator;

    fn build(rules: Vec<DeviceRule>, default_policy: DefaultPolicy) -> Program {
        let mut em = Emulator::with_default_policy(default_policy);
        em.add_rules(&rules);
        Program::from_rules(&em.rules, em.default_policy).unwrap()
    }

    fn rule(typ: DeviceType, major: DeviceNumber, minor: DeviceNumber, access: Access, allow: Policy) -> DeviceRule {
        DeviceRule { typ, major, minor, access, allow }
    }

    #[test]
    fn test_single_exact_match_allowed() {
        let prog = build(
            vec![rule(DeviceType::Char, DeviceNumber::Concrete(10), DeviceNumber::Concrete(20), Access::READ, Policy::Allow)],
            DefaultPolicy::DenyList,
        );

        for ty in [DeviceType::Char, DeviceType::Block] {
            for major in [10u32, 99] {
                for minor in [20u32, 0] {
                    for access in [Access::READ, Access::WRITE, Access::MKNOD] {
                        let ret = prog.execute(ty, major, minor, access);
                        let should_match = ty == DeviceType::Char && major == 10 && minor == 20 && access == Access::READ;
                        assert_eq!(ret, should_match as u64);
                    }
                }
            }
        }
    }

    #[test]
    fn test_deny_all_default() {
        let prog = build(vec![], DefaultPolicy::DenyList);
        assert_eq!(prog.execute(DeviceType::Char, 1, 1, Access::READ), 0);
    }

    #[test]
    fn test_allow_all_via_global_rule() {
        let mut em = Emulator::with_default_policy(DefaultPolicy::DenyList);
        em.add_rule(&rule(DeviceType::Any, DeviceNumber::Wildcard, DeviceNumber::Wildcard, Access::empty(), Policy::Allow));
        let prog = Program::from_rules(&em.rules, em.default_policy).unwrap();
        assert_eq!(prog.execute(DeviceType::Block, 250, 3, Access::MKNOD), 1);
    }

    #[test]
    fn test_wildcard_major_matches_any() {
        let prog = build(
            vec![rule(DeviceType::Char, DeviceNumber::Wildcard, DeviceNumber::Concrete(20), Access::READ, Policy::Allow)],
            DefaultPolicy::DenyList,
        );
        assert_eq!(prog.execute(DeviceType::Char, 7, 20, Access::READ), 1);
        assert_eq!(prog.execute(DeviceType::Char, 7, 21, Access::READ), 0);
    }

    #[test]
    fn test_most_recently_added_matching_rule_wins() {
        // Two rules target the same device; the emulator keeps both (no
        // type=any collapse). `Program::from_rules` walks the ruleset in
        // reverse, so the rule added last is emitted first in bytecode
        // and is the first one tested at runtime.
        let prog = build(
            vec![
                rule(DeviceType::Char, DeviceNumber::Concrete(1), DeviceNumber::Concrete(3), Access::READ, Policy::Allow),
                rule(DeviceType::Char, DeviceNumber::Concrete(1), DeviceNumber::Concrete(3), Access::READ, Policy::Deny),
            ],
            DefaultPolicy::DenyList,
        );
        assert_eq!(prog.execute(DeviceType::Char, 1, 3, Access::READ), 0);
    }
}
