use bytes::Bytes;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

/**
 * 동시성을 지원하는 키/값 사전.
 *
 * 모든 커넥션 태스크가 공유하는 유일한 가변 상태다. 각 연산은 개별적으로 원자적이며,
 * 호출자가 별도의 락을 잡을 필요가 없다. 키 사이의 순서는 보장하지 않는다.
 *
 * 키는 임의의 바이트열이며, UTF-8일 필요가 없다. 조회는 '&[u8]'로 한다.
 *
 * 내부적으로 샤드 단위로 락을 나누는 'DashMap'을 사용한다.
 */
#[derive(Debug)]
pub struct Dict<V> {
    inner: DashMap<Bytes, V>,
}

impl<V: Clone> Dict<V> {
    pub fn new() -> Dict<V> {
        Dict {
            inner: DashMap::new(),
        }
    }

    /// 키의 값을 복제하여 반환한다.
    pub fn get(&self, key: &[u8]) -> Option<V> {
        self.inner.get(key).map(|entry| entry.value().clone())
    }

    pub fn contains_key(&self, key: &[u8]) -> bool {
        self.inner.contains_key(key)
    }

    /// 값을 저장한다. 새로운 키였다면 1, 기존 값을 대체했다면 0을 반환한다.
    pub fn put(&self, key: Bytes, val: V) -> i64 {
        match self.inner.insert(key, val) {
            Some(_) => 0,
            None => 1,
        }
    }

    /// 키가 없을 때만 저장한다. 저장했다면 1을 반환한다.
    pub fn put_if_absent(&self, key: Bytes, val: V) -> i64 {
        match self.inner.entry(key) {
            Entry::Occupied(_) => 0,
            Entry::Vacant(entry) => {
                entry.insert(val);
                1
            }
        }
    }

    /// 키가 있을 때만 값을 대체한다. 대체했다면 1을 반환한다.
    pub fn put_if_exists(&self, key: &[u8], val: V) -> i64 {
        match self.inner.get_mut(key) {
            Some(mut slot) => {
                *slot = val;
                1
            }
            None => 0,
        }
    }

    /// 키를 삭제하고, 삭제된 값을 반환한다.
    pub fn remove(&self, key: &[u8]) -> Option<V> {
        self.inner.remove(key).map(|(_, val)| val)
    }

    /**
     * 모든 항목을 순회한다. 'consumer'가 'false'를 반환하면 순회를 멈춘다.
     *
     * 순회하는 동안 샤드의 읽기 락이 유지된다. 'consumer' 안에서 같은 사전에 쓰기를
     * 해서는 안 된다.
     */
    pub fn for_each<F>(&self, mut consumer: F)
    where
        F: FnMut(&Bytes, &V) -> bool,
    {
        for entry in self.inner.iter() {
            if !consumer(entry.key(), entry.value()) {
                break;
            }
        }
    }

    pub fn keys(&self) -> Vec<Bytes> {
        self.inner.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// 그 자리에서 모든 항목을 비운다. 이미 꺼내간 값에는 영향이 없다.
    pub fn clear(&self) {
        self.inner.clear();
    }
}

impl<V: Clone> Default for Dict<V> {
    fn default() -> Dict<V> {
        Dict::new()
    }
}
