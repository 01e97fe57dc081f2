//! Sensor description loaded from a `<sensor>` element

use std::fmt;
use std::str::FromStr;

use crate::element::{ElementId, ElementTree};
use crate::error::{ErrorCode, Errors, SdfError};
use crate::pose::Pose;

/// Kinds of sensor understood by the target format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SensorType {
    #[default]
    None,
    Altimeter,
    Camera,
    Contact,
    DepthCamera,
    ForceTorque,
    Gps,
    GpuLidar,
    Imu,
    LogicalCamera,
    Magnetometer,
    Multicamera,
    Lidar,
    Rfid,
    RfidTag,
    Sonar,
    WirelessReceiver,
    WirelessTransmitter,
    AirPressure,
}

impl SensorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SensorType::None => "none",
            SensorType::Altimeter => "altimeter",
            SensorType::Camera => "camera",
            SensorType::Contact => "contact",
            SensorType::DepthCamera => "depth_camera",
            SensorType::ForceTorque => "force_torque",
            SensorType::Gps => "gps",
            SensorType::GpuLidar => "gpu_lidar",
            SensorType::Imu => "imu",
            SensorType::LogicalCamera => "logical_camera",
            SensorType::Magnetometer => "magnetometer",
            SensorType::Multicamera => "multicamera",
            SensorType::Lidar => "lidar",
            SensorType::Rfid => "rfid",
            SensorType::RfidTag => "rfidtag",
            SensorType::Sonar => "sonar",
            SensorType::WirelessReceiver => "wireless_receiver",
            SensorType::WirelessTransmitter => "wireless_transmitter",
            SensorType::AirPressure => "air_pressure",
        }
    }
}

impl fmt::Display for SensorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SensorType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let kind = match s {
            "none" => SensorType::None,
            "altimeter" => SensorType::Altimeter,
            "camera" => SensorType::Camera,
            "contact" => SensorType::Contact,
            "depth_camera" | "depth" => SensorType::DepthCamera,
            "force_torque" => SensorType::ForceTorque,
            "gps" => SensorType::Gps,
            "gpu_lidar" | "gpu_ray" => SensorType::GpuLidar,
            "imu" => SensorType::Imu,
            "logical_camera" => SensorType::LogicalCamera,
            "magnetometer" => SensorType::Magnetometer,
            "multicamera" => SensorType::Multicamera,
            "lidar" | "ray" => SensorType::Lidar,
            "rfid" => SensorType::Rfid,
            "rfidtag" => SensorType::RfidTag,
            "sonar" => SensorType::Sonar,
            "wireless_receiver" => SensorType::WirelessReceiver,
            "wireless_transmitter" => SensorType::WirelessTransmitter,
            "air_pressure" => SensorType::AirPressure,
            other => return Err(format!("unknown sensor type [{}]", other)),
        };
        Ok(kind)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Sensor {
    pub name: String,
    pub sensor_type: SensorType,
    /// Empty when the element leaves the topic at its default
    pub topic: String,
    pub pose: Pose,
    pub pose_frame: String,
    pub update_rate: f64,
}

impl Sensor {
    /// Read a sensor from a `<sensor>` element
    pub fn load(tree: &ElementTree, id: ElementId) -> Result<Sensor, Errors> {
        if tree.name(id) != "sensor" {
            return Err(vec![SdfError::new(
                ErrorCode::ElementIncorrectType,
                format!(
                    "Attempting to load a Sensor, but the provided element is a <{}>",
                    tree.name(id)
                ),
            )]);
        }

        let name = match tree.try_get::<String>(id, "name").filter(|n| !n.is_empty()) {
            Some(name) => name,
            None => {
                return Err(vec![SdfError::new(
                    ErrorCode::AttributeMissing,
                    "A sensor name is required, but the name is not set.",
                )])
            }
        };

        let type_str = tree.try_get::<String>(id, "type").unwrap_or_default();
        let sensor_type = match type_str.parse::<SensorType>() {
            Ok(kind) => kind,
            Err(_) => {
                return Err(vec![SdfError::new(
                    ErrorCode::AttributeInvalid,
                    format!("Attempting to load sensor [{}] with unknown type [{}]", name, type_str),
                )])
            }
        };

        let topic = tree
            .try_get::<String>(id, "topic")
            .map(|t| t.trim().to_string())
            .filter(|t| t != "__default__")
            .unwrap_or_default();

        let (pose, pose_frame) = match tree.element(id, "pose") {
            Some(pose_id) => (
                tree.try_get::<Pose>(pose_id, "").unwrap_or_default(),
                tree.try_get::<String>(pose_id, "frame").unwrap_or_default(),
            ),
            None => (Pose::identity(), String::new()),
        };

        let update_rate = tree.try_get::<f64>(id, "update_rate").unwrap_or(0.0);

        Ok(Sensor {
            name,
            sensor_type,
            topic,
            pose,
            pose_frame,
            update_rate,
        })
    }

    pub fn type_str(&self) -> &'static str {
        self.sensor_type.as_str()
    }
}
