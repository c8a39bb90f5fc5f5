pub mod payment_sync;
