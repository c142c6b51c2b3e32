// Copyright (c) 2025 the lamina authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

use rustc_version::{Channel, version_meta};

fn main() {
    // The allocator-API compatibility shim keys off this cfg to pick
    // between the allocator-api2 polyfill and the unstable core APIs.
    // An undetectable toolchain is treated as stable.
    let nightly = version_meta().is_ok_and(|meta| meta.channel == Channel::Nightly);
    if nightly {
        println!("cargo:rustc-cfg=nightly");
    }
}
