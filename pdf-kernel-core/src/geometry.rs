//! Page boxes and the points that span them

use crate::objects::{Array, Object};

/// A point in default user space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn origin() -> Self {
        Self { x: 0.0, y: 0.0 }
    }
}

/// A rectangle such as `/MediaBox` or `/CropBox`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rectangle {
    pub lower_left: Point,
    pub upper_right: Point,
}

impl Rectangle {
    pub fn new(lower_left: Point, upper_right: Point) -> Self {
        Self {
            lower_left,
            upper_right,
        }
    }

    pub fn from_position_and_size(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            lower_left: Point::new(x, y),
            upper_right: Point::new(x + width, y + height),
        }
    }

    /// ISO A4, 595 x 842 points
    pub fn a4() -> Self {
        Self::from_position_and_size(0.0, 0.0, 595.0, 842.0)
    }

    /// US Letter, 612 x 792 points
    pub fn letter() -> Self {
        Self::from_position_and_size(0.0, 0.0, 612.0, 792.0)
    }

    pub fn width(&self) -> f64 {
        self.upper_right.x - self.lower_left.x
    }

    pub fn height(&self) -> f64 {
        self.upper_right.y - self.lower_left.y
    }

    /// The four-number array form used in page dictionaries.
    pub fn to_array(&self) -> Array {
        [
            self.lower_left.x,
            self.lower_left.y,
            self.upper_right.x,
            self.upper_right.y,
        ]
        .into_iter()
        .map(number_object)
        .collect()
    }

    /// Reads a rectangle array, normalizing swapped corners.
    pub fn from_array(array: &Array) -> Option<Self> {
        if array.len() != 4 {
            return None;
        }
        let values: Vec<f64> = array.iter().filter_map(Object::as_real).collect();
        if values.len() != 4 {
            return None;
        }
        Some(Self {
            lower_left: Point::new(values[0].min(values[2]), values[1].min(values[3])),
            upper_right: Point::new(values[0].max(values[2]), values[1].max(values[3])),
        })
    }
}

fn number_object(value: f64) -> Object {
    if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        Object::Integer(value as i64)
    } else {
        Object::Real(value)
    }
}

impl From<Rectangle> for Object {
    fn from(rect: Rectangle) -> Self {
        Object::Array(rect.to_array())
    }
}
