//! Macros for naming the integer slots that events, actions, lattice values
//! and neighbor offsets are addressed by.
//!
//! ```
//! kmcthinfilm::id_enum!(IntVal { IS_OCCUPIED, HEIGHT });
//! kmcthinfilm::offset_enum!(Hop { LEFT, RIGHT });
//!
//! assert_eq!(IntVal::HEIGHT, 1);
//! assert_eq!(IntVal::SIZE, 2);
//! assert_eq!(Hop::SELF, 0);
//! assert_eq!(Hop::RIGHT, 2);
//! assert_eq!(Hop::SIZE, 3);
//! ```

#[doc(hidden)]
#[macro_export]
macro_rules! __id_consts {
    ($n:expr;) => {
        pub const SIZE: usize = $n;
    };
    ($n:expr; $name:ident $(, $rest:ident)*) => {
        pub const $name: usize = $n;
        $crate::__id_consts!($n + 1; $($rest),*);
    };
}

/// Declares a module of consecutive `usize` ids starting at zero, plus `SIZE`.
#[macro_export]
macro_rules! id_enum {
    ($vis:vis $module:ident { $($name:ident),+ $(,)? }) => {
        #[allow(non_snake_case, dead_code)]
        $vis mod $module {
            $crate::__id_consts!(0usize; $($name),+);
        }
    };
}

/// Like [`id_enum!`], but reserves `SELF = 0` for the center offset of a
/// [`CellNeighOffsets`](crate::core::neighbors::CellNeighOffsets).
#[macro_export]
macro_rules! offset_enum {
    ($vis:vis $module:ident { $($name:ident),+ $(,)? }) => {
        #[allow(non_snake_case, dead_code)]
        $vis mod $module {
            $crate::__id_consts!(0usize; SELF, $($name),+);
        }
    };
}

#[cfg(test)]
mod tests {
    crate::id_enum!(Events { DEPOSITION, HOP_LEFT, HOP_RIGHT });
    crate::offset_enum!(Mix { NORTH, SOUTH });

    #[test]
    fn ids_are_consecutive_from_zero() {
        assert_eq!(Events::DEPOSITION, 0);
        assert_eq!(Events::HOP_LEFT, 1);
        assert_eq!(Events::HOP_RIGHT, 2);
        assert_eq!(Events::SIZE, 3);
    }

    #[test]
    fn offsets_reserve_self_slot() {
        assert_eq!(Mix::SELF, 0);
        assert_eq!(Mix::NORTH, 1);
        assert_eq!(Mix::SOUTH, 2);
        assert_eq!(Mix::SIZE, 3);
    }
}
