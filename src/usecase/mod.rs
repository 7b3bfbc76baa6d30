mod fulfill_order;
mod publish_voucher;
mod seckill_admission;

pub use fulfill_order::{CreateVoucherOrderUseCase, FulfillOrderUseCase};
pub use publish_voucher::PublishVoucherUseCase;
pub use seckill_admission::{
    SeckillAdmissionUseCase, SeckillAdmissionUsKsErr, SeckillRejectReason, VoucherCacheSource,
};
