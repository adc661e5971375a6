mod convert;
pub use convert::{SearchStage, complete_elliptic_k, to_normalized, to_physical};

mod descriptor;
pub use descriptor::{Bounds, Freeze, ParamDescriptor, ParamKind, ParamTable, Periodicity, Scale};
