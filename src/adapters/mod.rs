//! Adapters — concrete implementations of the network subsystem's ports.
//!
//! | Adapter     | Implements        | Connects to                     |
//! |-------------|-------------------|---------------------------------|
//! | `tcp`       | ServerSocketPort  | lwIP sockets / `std::net` (sim) |
//! | `wifi`      | LinkPort          | ESP-IDF WiFi STA / sim          |
//! | `mdns`      | DiscoveryPort     | ESP-IDF mDNS / sim              |
//! | `device_id` | —                 | eFuse factory MAC               |
//! | `time`      | —                 | esp_timer / `Instant` (sim)     |

pub mod device_id;
pub mod mdns;
pub mod tcp;
pub mod time;
pub mod wifi;
