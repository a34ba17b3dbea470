//! Solver unit tests.


mod narrow_tests;
mod recursion_tests;
mod solve_tests;
