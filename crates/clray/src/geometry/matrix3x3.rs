use std::ops::{Index, IndexMut, Mul};

use super::Vec3;

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Matrix3x3 {
    // row-major
    pub data: [[f32; 3]; 3],
}

impl Index<usize> for Matrix3x3 {
    type Output = f32;

    fn index(&self, index: usize) -> &Self::Output {
        &self.data[index / 3][index % 3]
    }
}

impl IndexMut<usize> for Matrix3x3 {
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.data[index / 3][index % 3]
    }
}

impl Matrix3x3 {
    pub fn identity() -> Self {
        Matrix3x3 {
            data: [
                [1.0, 0.0, 0.0],
                [0.0, 1.0, 0.0],
                [0.0, 0.0, 1.0],
            ],
        }
    }

    pub fn from_rows(r0: Vec3, r1: Vec3, r2: Vec3) -> Self {
        Matrix3x3 {
            data: [[r0.0, r0.1, r0.2],
                   [r1.0, r1.1, r1.2],
                   [r2.0, r2.1, r2.2]]
        }
    }

    pub fn row(&self, i: usize) -> Vec3 {
        Vec3(self.data[i][0], self.data[i][1], self.data[i][2])
    }

    pub fn column(&self, j: usize) -> Vec3 {
        Vec3(self.data[0][j], self.data[1][j], self.data[2][j])
    }

    pub fn transposed(&self) -> Self {
        let mut t = *self;
        for i in 0..3 {
            for j in 0..3 {
                t.data[i][j] = self.data[j][i];
            }
        }
        t
    }

    pub fn apply_vector(&self, v: Vec3) -> Vec3 {
        Vec3(
            Vec3::dot(self.row(0), v),
            Vec3::dot(self.row(1), v),
            Vec3::dot(self.row(2), v),
        )
    }

    /// Rotation about the x axis by `angle` radians
    pub fn rotation_x(angle: f32) -> Self {
        let (s, c) = angle.sin_cos();
        Matrix3x3::from_rows(
            Vec3(1.0, 0.0, 0.0),
            Vec3(0.0, c, -s),
            Vec3(0.0, s, c),
        )
    }

    /// Rotation about the y axis by `angle` radians
    pub fn rotation_y(angle: f32) -> Self {
        let (s, c) = angle.sin_cos();
        Matrix3x3::from_rows(
            Vec3(c, 0.0, s),
            Vec3(0.0, 1.0, 0.0),
            Vec3(-s, 0.0, c),
        )
    }
}

impl Mul for Matrix3x3 {
    type Output = Matrix3x3;

    fn mul(self, rhs: Self) -> Self::Output {
        let mut out = Matrix3x3 { data: [[0.0; 3]; 3] };
        for i in 0..3 {
            for j in 0..3 {
                out.data[i][j] = (0..3).map(|k| self.data[i][k] * rhs.data[k][j]).sum();
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotation_keeps_length() {
        let m = Matrix3x3::rotation_x(0.3) * Matrix3x3::rotation_y(-1.1);
        let v = Vec3(0.2, -0.5, 0.9);
        assert!((m.apply_vector(v).length() - v.length()).abs() < 1e-5);
        let back = m.transposed().apply_vector(m.apply_vector(v));
        assert!((back - v).length() < 1e-5);
    }
}
