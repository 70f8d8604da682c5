/*!
# VNet Peering DevKit

Test support for the peering exporter:
- Stub lister with scripted pages (no Azure account needed)
- Mock ARM server speaking the token and peering list endpoints
- Harness running poll cycles against a private metrics registry
*/

pub mod arm_stub;
pub mod stub_lister;
pub mod test_utils;

pub use arm_stub::{ArmPayloadBuilder, MockArmServer, MockPage};
pub use stub_lister::{PeeringBuilder, StubLister, StubPage};
pub use test_utils::TestHarness;
