mod voucher;
mod voucher_order;

pub use voucher::SeckillVoucherModel;
pub use voucher_order::{SeckillVerdict, VoucherOrderModel};
