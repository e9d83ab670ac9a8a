// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*! Resource bookkeeping: IDs, dirty ranges and views */

pub(crate) mod descriptors;
pub(crate) mod dirty_tracking;
pub(crate) mod resource_tracking;
pub mod visible_to;
