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

//! Decoded instruction model
//!
//! One MIPS word decodes into a [`TranslatedInsn`]: the operation tag, the
//! unpacked operand fields for its encoding class, and a branch
//! disposition. Dispatch over a [`Op`] tag is a jump table, so the
//! execution layer pays no re-decode cost per dispatch.
//!
//! Branches carry their disposition as a field instead of tripled
//! operation variants: `Local` stays inside the current page block, `Out`
//! leaves it, and `Idle` is the branch-to-self-over-a-nop spin loop the
//! dispatch loop can fast-forward.

/// Operation tag of one decoded instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    // Decoder bookkeeping
    /// Slot not decoded yet; a fetch landing here decodes forward
    NotTranslated,
    /// End-of-block sentinel appended after the last decoded instruction
    EndBlock,
    /// Architecturally reserved encoding
    Reserved,
    /// Valid encoding this core does not model
    NotImplemented,
    /// No-op (explicit `sll r0,r0,0` or a folded dead write)
    Nop,

    // Jumps and branches
    J,
    Jal,
    Jr,
    Jalr,
    Beq,
    Bne,
    Blez,
    Bgtz,
    Beql,
    Bnel,
    Blezl,
    Bgtzl,
    Bltz,
    Bgez,
    Bltzl,
    Bgezl,
    Bltzal,
    Bgezal,
    Bltzall,
    Bgezall,
    Bc1f,
    Bc1t,
    Bc1fl,
    Bc1tl,

    // Immediate arithmetic and logic
    Addi,
    Addiu,
    Slti,
    Sltiu,
    Andi,
    Ori,
    Xori,
    Lui,
    Daddi,
    Daddiu,

    // Loads
    Lb,
    Lbu,
    Lh,
    Lhu,
    Lw,
    Lwu,
    Lwl,
    Lwr,
    Ld,
    Ldl,
    Ldr,
    Ll,
    Lwc1,
    Ldc1,

    // Stores
    Sb,
    Sh,
    Sw,
    Swl,
    Swr,
    Sd,
    Sdl,
    Sdr,
    Sc,
    Swc1,
    Sdc1,

    /// CACHE op; the execution layer uses it to drive invalidation
    Cache,

    // Register arithmetic and logic
    Sll,
    Srl,
    Sra,
    Sllv,
    Srlv,
    Srav,
    Dsll,
    Dsrl,
    Dsra,
    Dsll32,
    Dsrl32,
    Dsra32,
    Dsllv,
    Dsrlv,
    Dsrav,
    Add,
    Addu,
    Sub,
    Subu,
    And,
    Or,
    Xor,
    Nor,
    Slt,
    Sltu,
    Dadd,
    Daddu,
    Dsub,
    Dsubu,
    Mult,
    Multu,
    Div,
    Divu,
    Dmult,
    Dmultu,
    Ddiv,
    Ddivu,
    Mfhi,
    Mthi,
    Mflo,
    Mtlo,
    Syscall,
    Sync,
    Teq,

    // System control (COP0)
    Mfc0,
    Mtc0,
    Tlbr,
    Tlbwi,
    Tlbwr,
    Tlbp,
    Eret,

    // FPU transfers (COP1)
    Mfc1,
    Dmfc1,
    Cfc1,
    Mtc1,
    Dmtc1,
    Ctc1,

    // FPU single precision
    AddS,
    SubS,
    MulS,
    DivS,
    SqrtS,
    AbsS,
    MovS,
    NegS,
    RoundLS,
    TruncLS,
    CeilLS,
    FloorLS,
    RoundWS,
    TruncWS,
    CeilWS,
    FloorWS,
    CvtDS,
    CvtWS,
    CvtLS,
    CFS,
    CUnS,
    CEqS,
    CUeqS,
    COltS,
    CUltS,
    COleS,
    CUleS,
    CSfS,
    CNgleS,
    CSeqS,
    CNglS,
    CLtS,
    CNgeS,
    CLeS,
    CNgtS,

    // FPU double precision
    AddD,
    SubD,
    MulD,
    DivD,
    SqrtD,
    AbsD,
    MovD,
    NegD,
    RoundLD,
    TruncLD,
    CeilLD,
    FloorLD,
    RoundWD,
    TruncWD,
    CeilWD,
    FloorWD,
    CvtSD,
    CvtWD,
    CvtLD,
    CFD,
    CUnD,
    CEqD,
    CUeqD,
    COltD,
    CUltD,
    COleD,
    CUleD,
    CSfD,
    CNgleD,
    CSeqD,
    CNglD,
    CLtD,
    CNgeD,
    CLeD,
    CNgtD,

    // FPU fixed-point conversions
    CvtSW,
    CvtDW,
    CvtSL,
    CvtDL,
}

impl Op {
    /// Does this operation transfer control?
    ///
    /// Control transfers are illegal in a delay slot; the decoder folds
    /// them to [`Op::Nop`] there.
    pub fn is_control_transfer(self) -> bool {
        matches!(
            self,
            Op::J
                | Op::Jal
                | Op::Jr
                | Op::Jalr
                | Op::Beq
                | Op::Bne
                | Op::Blez
                | Op::Bgtz
                | Op::Beql
                | Op::Bnel
                | Op::Blezl
                | Op::Bgtzl
                | Op::Bltz
                | Op::Bgez
                | Op::Bltzl
                | Op::Bgezl
                | Op::Bltzal
                | Op::Bgezal
                | Op::Bltzall
                | Op::Bgezall
                | Op::Bc1f
                | Op::Bc1t
                | Op::Bc1fl
                | Op::Bc1tl
                | Op::Eret
        )
    }
}

/// Unpacked operand fields, one layout per encoding class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operands {
    /// No operand fields (nops, sentinels, ERET, TLB ops)
    None,
    /// R-type: `rs`, `rt`, destination `rd`, shift amount `sa`
    Reg { rs: u8, rt: u8, rd: u8, sa: u8 },
    /// I-type: `rs`, `rt`, sign-extended immediate
    Imm { rs: u8, rt: u8, imm: i16 },
    /// J-type: absolute target address, already combined with the PC region
    Jump { target: u32 },
    /// FPU load/store: integer base register, FPU register, displacement
    Mem { base: u8, ft: u8, offset: i16 },
    /// FPU arithmetic: source/target/destination FPU registers
    Fpu { ft: u8, fs: u8, fd: u8 },
}

/// Where a branch goes relative to its page block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchDisposition {
    /// Not a branch, or a dynamic-target jump
    None,
    /// Static target inside the same page block
    Local,
    /// Static target outside the block, or the block's last word
    Out,
    /// Branch-to-self over a nop delay slot: a detectable spin loop
    Idle,
}

/// One decoded instruction slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TranslatedInsn {
    /// Virtual address the word was decoded at
    pub addr: u32,
    pub op: Op,
    pub operands: Operands,
    pub branch: BranchDisposition,
}

impl TranslatedInsn {
    /// A bookkeeping slot with no architectural content
    pub const fn meta(op: Op) -> Self {
        Self {
            addr: 0,
            op,
            operands: Operands::None,
            branch: BranchDisposition::None,
        }
    }
}
