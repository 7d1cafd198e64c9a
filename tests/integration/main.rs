// Integration test suite for Room Relay
//
// Organized into focused modules by endpoint area. WebSocket ingress is
// exercised at the subsystem level in the library's unit tests; these
// cover the HTTP surface and the wiring.

mod common;

mod cache_route;
mod messages;
mod status;
