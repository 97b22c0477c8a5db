use bytemuck::{Pod, Zeroable};

use super::BufferPool;

/// Vertices per chunk. Must stay a multiple of the vertex group sizes the
/// tessellators emit (2 for line segments, 3 for triangles, 4 for quads).
pub const CHUNK_VERTICES: usize = 360;

/// One GPU-ready vertex: position plus a texture/extrusion pair, packed to
/// 8 bytes so a compiled layer can be uploaded with a single cast.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct Vertex {
    pub x: i16,
    pub y: i16,
    pub u: i16,
    pub v: i16,
}

impl Vertex {
    pub fn new(x: i16, y: i16, u: i16, v: i16) -> Self {
        Self { x, y, u, v }
    }

    /// Build from float tile-local coordinates, clamped into short range
    pub fn from_f32(x: f32, y: f32) -> Self {
        Self {
            x: clamp_short(x),
            y: clamp_short(y),
            u: 0,
            v: 0,
        }
    }
}

fn clamp_short(v: f32) -> i16 {
    v.clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

/// Fixed-capacity vertex storage. Owned by exactly one [`VertexBuffer`]
/// until it is compiled or discarded, then spliced back into the pool.
#[derive(Debug)]
pub struct Chunk {
    pub vertices: [Vertex; CHUNK_VERTICES],
    pub used: usize,
}

impl Chunk {
    pub(super) fn new() -> Self {
        Self {
            vertices: [Vertex::default(); CHUNK_VERTICES],
            used: 0,
        }
    }

    pub fn remaining(&self) -> usize {
        CHUNK_VERTICES - self.used
    }

    /// The filled prefix of the chunk
    pub fn filled(&self) -> &[Vertex] {
        &self.vertices[..self.used]
    }
}

/// Append-only vertex writer backed by pooled chunks.
///
/// Chunks flow back to the pool when the buffer is compiled, cleared or
/// dropped, so a conversion pass that fails half way leaks nothing.
#[derive(Debug)]
pub struct VertexBuffer {
    pool: BufferPool,
    chunks: Vec<Box<Chunk>>,
    len: usize,
}

impl VertexBuffer {
    pub fn new(pool: &BufferPool) -> Self {
        Self {
            pool: pool.clone(),
            chunks: Vec::new(),
            len: 0,
        }
    }

    /// Total vertices written
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of chunks currently backing this buffer
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn push(&mut self, vertex: Vertex) {
        let need_chunk = match self.chunks.last() {
            Some(chunk) => chunk.used == CHUNK_VERTICES,
            None => true,
        };
        if need_chunk {
            self.chunks.push(self.pool.acquire());
        }
        let chunk = self.chunks.last_mut().unwrap();
        chunk.vertices[chunk.used] = vertex;
        chunk.used += 1;
        self.len += 1;
    }

    pub fn extend_from_slice(&mut self, vertices: &[Vertex]) {
        let mut rest = vertices;
        while !rest.is_empty() {
            let need_chunk = match self.chunks.last() {
                Some(chunk) => chunk.used == CHUNK_VERTICES,
                None => true,
            };
            if need_chunk {
                self.chunks.push(self.pool.acquire());
            }
            let chunk = self.chunks.last_mut().unwrap();
            let take = rest.len().min(chunk.remaining());
            chunk.vertices[chunk.used..chunk.used + take].copy_from_slice(&rest[..take]);
            chunk.used += take;
            self.len += take;
            rest = &rest[take..];
        }
    }

    /// Iterate the written vertices in order
    pub fn iter(&self) -> impl Iterator<Item = &Vertex> {
        self.chunks.iter().flat_map(|chunk| chunk.filled().iter())
    }

    /// Serialize all chunks into `out` and return the chunks to the pool.
    /// Returns the number of vertices appended. The buffer is empty
    /// afterwards and can be written again.
    pub fn compile_into(&mut self, out: &mut Vec<Vertex>) -> usize {
        let mut appended = 0;
        for chunk in &self.chunks {
            out.extend_from_slice(chunk.filled());
            appended += chunk.used;
        }
        self.release_chunks();
        appended
    }

    /// Discard all written vertices, returning the chunks to the pool
    pub fn clear(&mut self) {
        self.release_chunks();
    }

    fn release_chunks(&mut self) {
        if !self.chunks.is_empty() {
            self.pool.release(self.chunks.drain(..));
        }
        self.len = 0;
    }
}

impl Drop for VertexBuffer {
    fn drop(&mut self) {
        self.release_chunks();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_spans_chunks() {
        let pool = BufferPool::new(16);
        let mut buffer = VertexBuffer::new(&pool);
        for i in 0..CHUNK_VERTICES + 10 {
            buffer.push(Vertex::new(i as i16, 0, 0, 0));
        }
        assert_eq!(buffer.len(), CHUNK_VERTICES + 10);
        assert_eq!(buffer.chunk_count(), 2);

        let collected: Vec<_> = buffer.iter().copied().collect();
        assert_eq!(collected.len(), CHUNK_VERTICES + 10);
        assert_eq!(collected[CHUNK_VERTICES].x, CHUNK_VERTICES as i16);
    }

    #[test]
    fn test_extend_from_slice_matches_push() {
        let pool = BufferPool::new(16);
        let vertices: Vec<_> = (0..800).map(|i| Vertex::new(i as i16, -1, 0, 0)).collect();

        let mut a = VertexBuffer::new(&pool);
        let mut b = VertexBuffer::new(&pool);
        a.extend_from_slice(&vertices);
        for v in &vertices {
            b.push(*v);
        }

        let av: Vec<_> = a.iter().copied().collect();
        let bv: Vec<_> = b.iter().copied().collect();
        assert_eq!(av, bv);
    }

    #[test]
    fn test_compile_drains_and_pools() {
        let pool = BufferPool::new(16);
        let mut buffer = VertexBuffer::new(&pool);
        buffer.extend_from_slice(&[Vertex::new(1, 2, 0, 0); 500]);
        let chunks = buffer.chunk_count();

        let mut out = Vec::new();
        let n = buffer.compile_into(&mut out);
        assert_eq!(n, 500);
        assert_eq!(out.len(), 500);
        assert!(buffer.is_empty());
        assert_eq!(pool.pooled(), chunks);

        // buffer is reusable after compile
        buffer.push(Vertex::new(9, 9, 0, 0));
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn test_drop_returns_chunks() {
        let pool = BufferPool::new(16);
        {
            let mut buffer = VertexBuffer::new(&pool);
            buffer.extend_from_slice(&[Vertex::default(); 400]);
            assert_eq!(pool.stats().in_use(), 2);
        }
        assert_eq!(pool.stats().in_use(), 0);
        assert_eq!(pool.pooled(), 2);
    }

    #[test]
    fn test_vertex_clamps_to_short_range() {
        let v = Vertex::from_f32(1e6, -1e6);
        assert_eq!(v.x, i16::MAX);
        assert_eq!(v.y, i16::MIN);
    }
}
