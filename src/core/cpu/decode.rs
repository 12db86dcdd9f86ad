// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 itsakeyfut
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! MIPS word decoder
//!
//! Turns one raw instruction word into a [`TranslatedInsn`]. The major
//! opcode selects the encoding class; SPECIAL, REGIMM and the coprocessor
//! groups dispatch on their own sub-fields.
//!
//! Two folds happen at decode time so the dispatch loop never pays for
//! them:
//! - Dead writes to `r0` (R-type results, I-type targets of loads and
//!   immediates) become [`Op::Nop`].
//! - Branches compute their static target once and record a
//!   [`BranchDisposition`]: `Local` inside the page block, `Out` when the
//!   target leaves it or the branch sits in the block's last word, `Idle`
//!   for a branch-to-self over a nop.

use crate::core::cpu::ops::{BranchDisposition, Op, Operands, TranslatedInsn};

/// Context one word is decoded in
#[derive(Debug, Clone, Copy)]
pub struct DecodeContext {
    /// Virtual address of the word
    pub addr: u32,
    /// Virtual address of the first word of the page block
    pub block_start: u32,
    /// Virtual address one past the last word of the page block
    pub block_end: u32,
    /// Is the following word the canonical nop?
    pub next_is_nop: bool,
}

#[inline(always)]
fn op_rs(word: u32) -> u8 {
    ((word >> 21) & 0x1F) as u8
}

#[inline(always)]
fn op_rt(word: u32) -> u8 {
    ((word >> 16) & 0x1F) as u8
}

#[inline(always)]
fn op_rd(word: u32) -> u8 {
    ((word >> 11) & 0x1F) as u8
}

#[inline(always)]
fn op_sa(word: u32) -> u8 {
    ((word >> 6) & 0x1F) as u8
}

#[inline(always)]
fn op_imm(word: u32) -> i16 {
    word as u16 as i16
}

#[inline(always)]
fn op_ft(word: u32) -> u8 {
    ((word >> 16) & 0x1F) as u8
}

#[inline(always)]
fn op_fs(word: u32) -> u8 {
    ((word >> 11) & 0x1F) as u8
}

#[inline(always)]
fn op_fd(word: u32) -> u8 {
    ((word >> 6) & 0x1F) as u8
}

#[inline(always)]
fn reg_operands(word: u32) -> Operands {
    Operands::Reg {
        rs: op_rs(word),
        rt: op_rt(word),
        rd: op_rd(word),
        sa: op_sa(word),
    }
}

#[inline(always)]
fn imm_operands(word: u32) -> Operands {
    Operands::Imm {
        rs: op_rs(word),
        rt: op_rt(word),
        imm: op_imm(word),
    }
}

#[inline(always)]
fn mem_operands(word: u32) -> Operands {
    Operands::Mem {
        base: op_rs(word),
        ft: op_ft(word),
        offset: op_imm(word),
    }
}

#[inline(always)]
fn fpu_operands(word: u32) -> Operands {
    Operands::Fpu {
        ft: op_ft(word),
        fs: op_fs(word),
        fd: op_fd(word),
    }
}

/// Classify a static branch target against the enclosing page block
fn disposition(target: u32, ctx: &DecodeContext) -> BranchDisposition {
    if target == ctx.addr && ctx.next_is_nop {
        BranchDisposition::Idle
    } else if target < ctx.block_start
        || target > ctx.block_end.wrapping_sub(4)
        || ctx.addr == ctx.block_end.wrapping_sub(4)
    {
        BranchDisposition::Out
    } else {
        BranchDisposition::Local
    }
}

fn branch(op: Op, word: u32, ctx: &DecodeContext) -> TranslatedInsn {
    let imm = op_imm(word);
    let target = ctx
        .addr
        .wrapping_add(4)
        .wrapping_add(((imm as i32) << 2) as u32);
    TranslatedInsn {
        addr: ctx.addr,
        op,
        operands: imm_operands(word),
        branch: disposition(target, ctx),
    }
}

fn jump(op: Op, word: u32, ctx: &DecodeContext) -> TranslatedInsn {
    let target = (ctx.addr.wrapping_add(4) & 0xF000_0000) | ((word & 0x03FF_FFFF) << 2);
    TranslatedInsn {
        addr: ctx.addr,
        op,
        operands: Operands::Jump { target },
        branch: disposition(target, ctx),
    }
}

fn plain(op: Op, operands: Operands, ctx: &DecodeContext) -> TranslatedInsn {
    TranslatedInsn {
        addr: ctx.addr,
        op,
        operands,
        branch: BranchDisposition::None,
    }
}

fn nop(ctx: &DecodeContext) -> TranslatedInsn {
    plain(Op::Nop, Operands::None, ctx)
}

/// R-type whose only effect is writing `rd`; folds to nop when `rd` is r0
fn reg_write(op: Op, word: u32, ctx: &DecodeContext) -> TranslatedInsn {
    if op_rd(word) == 0 {
        nop(ctx)
    } else {
        plain(op, reg_operands(word), ctx)
    }
}

/// I-type whose only effect is writing `rt`; folds to nop when `rt` is r0
fn imm_write(op: Op, word: u32, ctx: &DecodeContext) -> TranslatedInsn {
    if op_rt(word) == 0 {
        nop(ctx)
    } else {
        plain(op, imm_operands(word), ctx)
    }
}

/// Coprocessor move whose only effect is writing GPR `rt`
fn cop_to_gpr(op: Op, word: u32, ctx: &DecodeContext) -> TranslatedInsn {
    if op_rt(word) == 0 {
        nop(ctx)
    } else {
        plain(op, reg_operands(word), ctx)
    }
}

/// Decode one instruction word
pub fn decode_word(word: u32, ctx: &DecodeContext) -> TranslatedInsn {
    match word >> 26 {
        0x00 => decode_special(word, ctx),
        0x01 => decode_regimm(word, ctx),
        0x02 => jump(Op::J, word, ctx),
        0x03 => jump(Op::Jal, word, ctx),
        0x04 => branch(Op::Beq, word, ctx),
        0x05 => branch(Op::Bne, word, ctx),
        0x06 => branch(Op::Blez, word, ctx),
        0x07 => branch(Op::Bgtz, word, ctx),
        0x08 => imm_write(Op::Addi, word, ctx),
        0x09 => imm_write(Op::Addiu, word, ctx),
        0x0A => imm_write(Op::Slti, word, ctx),
        0x0B => imm_write(Op::Sltiu, word, ctx),
        0x0C => imm_write(Op::Andi, word, ctx),
        0x0D => imm_write(Op::Ori, word, ctx),
        0x0E => imm_write(Op::Xori, word, ctx),
        0x0F => imm_write(Op::Lui, word, ctx),
        0x10 => decode_cop0(word, ctx),
        0x11 => decode_cop1(word, ctx),
        0x12 | 0x13 => plain(Op::NotImplemented, Operands::None, ctx),
        0x14 => branch(Op::Beql, word, ctx),
        0x15 => branch(Op::Bnel, word, ctx),
        0x16 => branch(Op::Blezl, word, ctx),
        0x17 => branch(Op::Bgtzl, word, ctx),
        0x18 => imm_write(Op::Daddi, word, ctx),
        0x19 => imm_write(Op::Daddiu, word, ctx),
        0x1A => imm_write(Op::Ldl, word, ctx),
        0x1B => imm_write(Op::Ldr, word, ctx),
        0x20 => imm_write(Op::Lb, word, ctx),
        0x21 => imm_write(Op::Lh, word, ctx),
        0x22 => imm_write(Op::Lwl, word, ctx),
        0x23 => imm_write(Op::Lw, word, ctx),
        0x24 => imm_write(Op::Lbu, word, ctx),
        0x25 => imm_write(Op::Lhu, word, ctx),
        0x26 => imm_write(Op::Lwr, word, ctx),
        0x27 => imm_write(Op::Lwu, word, ctx),
        0x28 => plain(Op::Sb, imm_operands(word), ctx),
        0x29 => plain(Op::Sh, imm_operands(word), ctx),
        0x2A => plain(Op::Swl, imm_operands(word), ctx),
        0x2B => plain(Op::Sw, imm_operands(word), ctx),
        0x2C => plain(Op::Sdl, imm_operands(word), ctx),
        0x2D => plain(Op::Sdr, imm_operands(word), ctx),
        0x2E => plain(Op::Swr, imm_operands(word), ctx),
        0x2F => plain(Op::Cache, imm_operands(word), ctx),
        0x30 => imm_write(Op::Ll, word, ctx),
        0x31 => plain(Op::Lwc1, mem_operands(word), ctx),
        0x32 | 0x33 | 0x34 | 0x36 => plain(Op::NotImplemented, Operands::None, ctx),
        0x35 => plain(Op::Ldc1, mem_operands(word), ctx),
        0x37 => imm_write(Op::Ld, word, ctx),
        0x38 => plain(Op::Sc, imm_operands(word), ctx),
        0x39 => plain(Op::Swc1, mem_operands(word), ctx),
        0x3A | 0x3B | 0x3C | 0x3E => plain(Op::NotImplemented, Operands::None, ctx),
        0x3D => plain(Op::Sdc1, mem_operands(word), ctx),
        0x3F => plain(Op::Sd, imm_operands(word), ctx),
        _ => plain(Op::Reserved, Operands::None, ctx),
    }
}

fn decode_special(word: u32, ctx: &DecodeContext) -> TranslatedInsn {
    match word & 0x3F {
        0x00 => reg_write(Op::Sll, word, ctx),
        0x02 => reg_write(Op::Srl, word, ctx),
        0x03 => reg_write(Op::Sra, word, ctx),
        0x04 => reg_write(Op::Sllv, word, ctx),
        0x06 => reg_write(Op::Srlv, word, ctx),
        0x07 => reg_write(Op::Srav, word, ctx),
        0x08 => plain(Op::Jr, reg_operands(word), ctx),
        0x09 => plain(Op::Jalr, reg_operands(word), ctx),
        0x0C => plain(Op::Syscall, Operands::None, ctx),
        0x0D => plain(Op::NotImplemented, Operands::None, ctx),
        0x0F => plain(Op::Sync, Operands::None, ctx),
        0x10 => reg_write(Op::Mfhi, word, ctx),
        0x11 => plain(Op::Mthi, reg_operands(word), ctx),
        0x12 => reg_write(Op::Mflo, word, ctx),
        0x13 => plain(Op::Mtlo, reg_operands(word), ctx),
        0x14 => reg_write(Op::Dsllv, word, ctx),
        0x16 => reg_write(Op::Dsrlv, word, ctx),
        0x17 => reg_write(Op::Dsrav, word, ctx),
        0x18 => plain(Op::Mult, reg_operands(word), ctx),
        0x19 => plain(Op::Multu, reg_operands(word), ctx),
        0x1A => plain(Op::Div, reg_operands(word), ctx),
        0x1B => plain(Op::Divu, reg_operands(word), ctx),
        0x1C => plain(Op::Dmult, reg_operands(word), ctx),
        0x1D => plain(Op::Dmultu, reg_operands(word), ctx),
        0x1E => plain(Op::Ddiv, reg_operands(word), ctx),
        0x1F => plain(Op::Ddivu, reg_operands(word), ctx),
        0x20 => reg_write(Op::Add, word, ctx),
        0x21 => reg_write(Op::Addu, word, ctx),
        0x22 => reg_write(Op::Sub, word, ctx),
        0x23 => reg_write(Op::Subu, word, ctx),
        0x24 => reg_write(Op::And, word, ctx),
        0x25 => reg_write(Op::Or, word, ctx),
        0x26 => reg_write(Op::Xor, word, ctx),
        0x27 => reg_write(Op::Nor, word, ctx),
        0x2A => reg_write(Op::Slt, word, ctx),
        0x2B => reg_write(Op::Sltu, word, ctx),
        0x2C => reg_write(Op::Dadd, word, ctx),
        0x2D => reg_write(Op::Daddu, word, ctx),
        0x2E => reg_write(Op::Dsub, word, ctx),
        0x2F => reg_write(Op::Dsubu, word, ctx),
        0x30 | 0x31 | 0x32 | 0x33 | 0x36 => plain(Op::NotImplemented, Operands::None, ctx),
        0x34 => plain(Op::Teq, reg_operands(word), ctx),
        0x38 => reg_write(Op::Dsll, word, ctx),
        0x3A => reg_write(Op::Dsrl, word, ctx),
        0x3B => reg_write(Op::Dsra, word, ctx),
        0x3C => reg_write(Op::Dsll32, word, ctx),
        0x3E => reg_write(Op::Dsrl32, word, ctx),
        0x3F => reg_write(Op::Dsra32, word, ctx),
        _ => plain(Op::Reserved, Operands::None, ctx),
    }
}

fn decode_regimm(word: u32, ctx: &DecodeContext) -> TranslatedInsn {
    match (word >> 16) & 0x1F {
        0x00 => branch(Op::Bltz, word, ctx),
        0x01 => branch(Op::Bgez, word, ctx),
        0x02 => branch(Op::Bltzl, word, ctx),
        0x03 => branch(Op::Bgezl, word, ctx),
        0x08..=0x0C | 0x0E => plain(Op::NotImplemented, Operands::None, ctx),
        0x10 => branch(Op::Bltzal, word, ctx),
        0x11 => branch(Op::Bgezal, word, ctx),
        0x12 => branch(Op::Bltzall, word, ctx),
        0x13 => branch(Op::Bgezall, word, ctx),
        _ => plain(Op::Reserved, Operands::None, ctx),
    }
}

fn decode_cop0(word: u32, ctx: &DecodeContext) -> TranslatedInsn {
    match (word >> 21) & 0x1F {
        0x00 => cop_to_gpr(Op::Mfc0, word, ctx),
        0x04 => plain(Op::Mtc0, reg_operands(word), ctx),
        0x10..=0x1F => match word & 0x3F {
            0x01 => plain(Op::Tlbr, Operands::None, ctx),
            0x02 => plain(Op::Tlbwi, Operands::None, ctx),
            0x06 => plain(Op::Tlbwr, Operands::None, ctx),
            0x08 => plain(Op::Tlbp, Operands::None, ctx),
            0x18 => plain(Op::Eret, Operands::None, ctx),
            _ => plain(Op::NotImplemented, Operands::None, ctx),
        },
        _ => plain(Op::NotImplemented, Operands::None, ctx),
    }
}

fn decode_cop1(word: u32, ctx: &DecodeContext) -> TranslatedInsn {
    match (word >> 21) & 0x1F {
        0x00 => cop_to_gpr(Op::Mfc1, word, ctx),
        0x01 => cop_to_gpr(Op::Dmfc1, word, ctx),
        0x02 => cop_to_gpr(Op::Cfc1, word, ctx),
        0x04 => plain(Op::Mtc1, reg_operands(word), ctx),
        0x05 => plain(Op::Dmtc1, reg_operands(word), ctx),
        0x06 => plain(Op::Ctc1, reg_operands(word), ctx),
        0x08 => match (word >> 16) & 0x03 {
            0x00 => branch(Op::Bc1f, word, ctx),
            0x01 => branch(Op::Bc1t, word, ctx),
            0x02 => branch(Op::Bc1fl, word, ctx),
            _ => branch(Op::Bc1tl, word, ctx),
        },
        0x10 => decode_fpu_s(word, ctx),
        0x11 => decode_fpu_d(word, ctx),
        0x14 => match word & 0x3F {
            0x20 => plain(Op::CvtSW, fpu_operands(word), ctx),
            0x21 => plain(Op::CvtDW, fpu_operands(word), ctx),
            _ => plain(Op::Reserved, Operands::None, ctx),
        },
        0x15 => match word & 0x3F {
            0x20 => plain(Op::CvtSL, fpu_operands(word), ctx),
            0x21 => plain(Op::CvtDL, fpu_operands(word), ctx),
            _ => plain(Op::Reserved, Operands::None, ctx),
        },
        _ => plain(Op::Reserved, Operands::None, ctx),
    }
}

const FPU_S_OPS: [Op; 16] = [
    Op::AddS,
    Op::SubS,
    Op::MulS,
    Op::DivS,
    Op::SqrtS,
    Op::AbsS,
    Op::MovS,
    Op::NegS,
    Op::RoundLS,
    Op::TruncLS,
    Op::CeilLS,
    Op::FloorLS,
    Op::RoundWS,
    Op::TruncWS,
    Op::CeilWS,
    Op::FloorWS,
];

const FPU_S_COMPARES: [Op; 16] = [
    Op::CFS,
    Op::CUnS,
    Op::CEqS,
    Op::CUeqS,
    Op::COltS,
    Op::CUltS,
    Op::COleS,
    Op::CUleS,
    Op::CSfS,
    Op::CNgleS,
    Op::CSeqS,
    Op::CNglS,
    Op::CLtS,
    Op::CNgeS,
    Op::CLeS,
    Op::CNgtS,
];

const FPU_D_OPS: [Op; 16] = [
    Op::AddD,
    Op::SubD,
    Op::MulD,
    Op::DivD,
    Op::SqrtD,
    Op::AbsD,
    Op::MovD,
    Op::NegD,
    Op::RoundLD,
    Op::TruncLD,
    Op::CeilLD,
    Op::FloorLD,
    Op::RoundWD,
    Op::TruncWD,
    Op::CeilWD,
    Op::FloorWD,
];

const FPU_D_COMPARES: [Op; 16] = [
    Op::CFD,
    Op::CUnD,
    Op::CEqD,
    Op::CUeqD,
    Op::COltD,
    Op::CUltD,
    Op::COleD,
    Op::CUleD,
    Op::CSfD,
    Op::CNgleD,
    Op::CSeqD,
    Op::CNglD,
    Op::CLtD,
    Op::CNgeD,
    Op::CLeD,
    Op::CNgtD,
];

fn decode_fpu_s(word: u32, ctx: &DecodeContext) -> TranslatedInsn {
    match word & 0x3F {
        f @ 0x00..=0x0F => plain(FPU_S_OPS[f as usize], fpu_operands(word), ctx),
        0x21 => plain(Op::CvtDS, fpu_operands(word), ctx),
        0x24 => plain(Op::CvtWS, fpu_operands(word), ctx),
        0x25 => plain(Op::CvtLS, fpu_operands(word), ctx),
        f @ 0x30..=0x3F => plain(FPU_S_COMPARES[(f - 0x30) as usize], fpu_operands(word), ctx),
        _ => plain(Op::Reserved, Operands::None, ctx),
    }
}

fn decode_fpu_d(word: u32, ctx: &DecodeContext) -> TranslatedInsn {
    match word & 0x3F {
        f @ 0x00..=0x0F => plain(FPU_D_OPS[f as usize], fpu_operands(word), ctx),
        0x20 => plain(Op::CvtSD, fpu_operands(word), ctx),
        0x24 => plain(Op::CvtWD, fpu_operands(word), ctx),
        0x25 => plain(Op::CvtLD, fpu_operands(word), ctx),
        f @ 0x30..=0x3F => plain(FPU_D_COMPARES[(f - 0x30) as usize], fpu_operands(word), ctx),
        _ => plain(Op::Reserved, Operands::None, ctx),
    }
}

/// Decode the word sitting in a branch delay slot
///
/// Control transfers are architecturally undefined there; folding them to
/// nop keeps the block well formed.
pub fn decode_delay_slot(word: u32, ctx: &DecodeContext) -> TranslatedInsn {
    let insn = decode_word(word, ctx);
    if insn.op.is_control_transfer() {
        log::warn!(
            "control transfer in delay slot at 0x{:08X}, folded to nop",
            ctx.addr
        );
        nop(ctx)
    } else {
        insn
    }
}
