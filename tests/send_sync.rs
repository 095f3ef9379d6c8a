//! Send/Sync guarantees for core types.

use femtoship::{
    BackoffOverrides, ClientCredentials, FemtoShipper, PemFiles, RecordBuffer, ShipperBuilder,
    ShipperConfig, ShipperSettings, StatsSnapshot,
};
use rstest::rstest;
use static_assertions::assert_impl_all;

#[rstest]
fn builders_are_send_sync() {
    assert_impl_all!(ShipperBuilder: Send, Sync);
    assert_impl_all!(BackoffOverrides: Send, Sync);
    assert_impl_all!(ShipperConfig: Send, Sync);
    assert_impl_all!(ShipperSettings: Send, Sync);
}

#[rstest]
fn components_are_send_sync() {
    assert_impl_all!(FemtoShipper: Send, Sync);
    assert_impl_all!(RecordBuffer: Send, Sync);
    assert_impl_all!(ClientCredentials: Send, Sync);
    assert_impl_all!(PemFiles: Send, Sync);
    assert_impl_all!(StatsSnapshot: Send, Sync, Copy);
}
