//! Whole-scheduler tests: kernel facade behavior, blocking semantics,
//! priority inheritance, time slicing, timers and interrupt plumbing.

mod helpers;
