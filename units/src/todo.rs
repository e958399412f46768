/// Units which are simply type aliases for `f64` rather than having an
/// implementation as a `uom` `Quantity`.
///
/// These are used in the per-photon hot paths, where every value is already
/// expressed in the internal unit noted beside each alias, and in places where
/// `uom` offers no convenient parser (spatial frequency).

pub type Lengthf64    = f64; // mm
pub type Timef64      = f64; // ns
pub type Anglef64     = f64; // rad
pub type PerLengthf64 = f64; // 1/mm: mua, mus, fx. TODO uom PerLength with a parser
pub type Weightf64    = f64;
pub type Ratiof64     = f64;
