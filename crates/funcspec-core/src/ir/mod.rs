//! SSA intermediate representation consumed and mutated by the specializer.
//!
//! The IR is arena-indexed: a [`Module`] owns function slots addressed by
//! [`FuncId`] and globals addressed by [`GlobalId`]; each [`Function`] owns its
//! blocks ([`BlockId`]) and an instruction arena ([`InstId`]). Values are
//! function-local ([`ValueId`]), which keeps a cloned function's ids valid
//! without any remapping.

pub mod builder;
pub mod constant;
pub mod def_use;
pub mod fold;
pub mod function;
pub mod inst;
pub mod module;
pub mod printer;
pub mod types;

pub use builder::FunctionBuilder;
pub use constant::Constant;
pub use def_use::DefUse;
pub use function::{Block, FnAttrs, Function, Linkage, Param, ParamAttrs};
pub use inst::{
    BinaryOp, CallAttrs, CallInst, CastOp, CmpPredicate, InstData, InstKind, Operand, UnaryOp,
    ValueId,
};
pub use module::{CallSiteRef, Global, Module};
pub use types::{FnType, Type};

use serde::{Deserialize, Serialize};

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        pub struct $name(pub u32);

        impl $name {
            /// Position of this entity in its owning arena.
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}{}", $prefix, self.0)
            }
        }
    };
}

entity_id!(
    /// Identifier of a function slot in a [`Module`].
    FuncId,
    "F"
);
entity_id!(
    /// Identifier of a global variable in a [`Module`].
    GlobalId,
    "G"
);
entity_id!(
    /// Identifier of a basic block within one [`Function`].
    BlockId,
    "B"
);
entity_id!(
    /// Identifier of an instruction within one [`Function`]'s arena.
    InstId,
    "I"
);

impl BlockId {
    /// The entry block: control flow enters a function here.
    pub const ENTRY: BlockId = BlockId(0);
}
