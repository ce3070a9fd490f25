//! Rough throughput checks for the allocator hot paths
