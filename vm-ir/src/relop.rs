//! 关系运算码
//!
//! 编码按位组合：unsigned = 8、signed = 4、equal = 2、invert = 1。
//! 取反某个关系只需翻转最低位。

use vm_core::{DecodeError, GuestWord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum RelOp {
    False = 0,
    True = 1,
    Eq = 2,
    Ne = 3,
    Lt = 4,
    Ge = 5,
    Le = 6,
    Gt = 7,
    Ltu = 8,
    Geu = 9,
    Leu = 10,
    Gtu = 11,
}

impl RelOp {
    pub const ALL: [RelOp; 12] = [
        RelOp::False,
        RelOp::True,
        RelOp::Eq,
        RelOp::Ne,
        RelOp::Lt,
        RelOp::Ge,
        RelOp::Le,
        RelOp::Gt,
        RelOp::Ltu,
        RelOp::Geu,
        RelOp::Leu,
        RelOp::Gtu,
    ];

    pub fn code(self) -> u32 {
        self as u32
    }

    /// 逻辑取反后的关系
    pub fn invert(self) -> RelOp {
        match self {
            RelOp::False => RelOp::True,
            RelOp::True => RelOp::False,
            RelOp::Eq => RelOp::Ne,
            RelOp::Ne => RelOp::Eq,
            RelOp::Lt => RelOp::Ge,
            RelOp::Ge => RelOp::Lt,
            RelOp::Le => RelOp::Gt,
            RelOp::Gt => RelOp::Le,
            RelOp::Ltu => RelOp::Geu,
            RelOp::Geu => RelOp::Ltu,
            RelOp::Leu => RelOp::Gtu,
            RelOp::Gtu => RelOp::Leu,
        }
    }

    pub fn eval<W: GuestWord>(self, a: W, b: W) -> bool {
        match self {
            RelOp::False => false,
            RelOp::True => true,
            RelOp::Eq => a == b,
            RelOp::Ne => a != b,
            RelOp::Lt => a.as_i64() < b.as_i64(),
            RelOp::Ge => a.as_i64() >= b.as_i64(),
            RelOp::Le => a.as_i64() <= b.as_i64(),
            RelOp::Gt => a.as_i64() > b.as_i64(),
            RelOp::Ltu => a < b,
            RelOp::Geu => a >= b,
            RelOp::Leu => a <= b,
            RelOp::Gtu => a > b,
        }
    }
}

impl TryFrom<u32> for RelOp {
    type Error = DecodeError;

    fn try_from(code: u32) -> Result<Self, Self::Error> {
        RelOp::ALL
            .into_iter()
            .find(|op| op.code() == code)
            .ok_or(DecodeError::UnknownRelOp(code))
    }
}
