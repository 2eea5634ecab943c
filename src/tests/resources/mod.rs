mod clock_tests;
mod lifecycle_tests;
mod network_tests;
mod provisioning_tests;
mod teardown_tests;
