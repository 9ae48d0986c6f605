// Test modules for Portgate
// Unit tests for leaf modules live next to their code; these drive the
// gateway client end to end through a recording mock transport

mod manager_tests;
